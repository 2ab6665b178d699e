//! Per-host cooldowns driven by server `Retry-After` guidance.
//!
//! When a server answers with a throttling status, requests to that host are
//! held back until the cooldown it asked for is over, and the throttled
//! request is sent again.
//!
//! # Architecture
//!
//! - [`HostKey`]: Represents a hostname for throttling
//! - [`CooldownTimer`]: A one-shot deadline shared by all requests to a host
//! - [`ThrottleCoordinator`]: Holds the timer of every host and hooks into dispatching
//! - [`ThrottleConfig`]: Which statuses throttle and how much margin to add
//! - [`retry_at_from_headers`] and friends: Turn `Date`/`Retry-After` into a deadline

mod config;
mod coordinator;
mod headers;
mod key;
mod timer;

pub use config::ThrottleConfig;
pub use coordinator::ThrottleCoordinator;
pub use headers::{
    RetryAfter, RetryAfterParseError, compute_retry_at, parse_retry_after,
    parse_retry_after_header, retry_at_from_headers, try_parse_retry_after,
};
pub use key::HostKey;
pub use timer::CooldownTimer;
