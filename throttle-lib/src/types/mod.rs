mod error;

pub use error::ErrorKind;

/// The throttle `Result` type
pub type Result<T> = std::result::Result<T, crate::ErrorKind>;
