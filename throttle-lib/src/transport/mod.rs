//! Reference transport: a parallel, hook-aware HTTP dispatcher built on
//! `reqwest`.

mod dispatcher;
mod request;
mod response;

pub(crate) use dispatcher::QueueHandle;
pub use dispatcher::{
    DEFAULT_MAX_CONCURRENCY, DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT, Dispatcher,
    DispatcherBuilder,
};
pub use request::{Request, RequestId};
pub use response::Response;
