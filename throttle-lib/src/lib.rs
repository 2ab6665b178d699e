//! `throttle` coordinates per-host cooldowns for concurrent HTTP clients.
//!
//! When a server answers `429 Too Many Requests` or `503 Service Unavailable`
//! with a `Retry-After` header, every further request to that host is held
//! back until the cooldown is over, and the throttled request is sent again.
//! Requests to other hosts keep flowing.
//!
//! ```no_run
//! use throttle_lib::ratelimit::{ThrottleConfig, ThrottleCoordinator};
//! use throttle_lib::{Client, DispatcherBuilder, Request, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!   let dispatcher = DispatcherBuilder::builder()
//!       .max_concurrency(16_usize)
//!       .build()
//!       .dispatcher()?;
//!   let coordinator = ThrottleCoordinator::install(ThrottleConfig::default(), &dispatcher);
//!
//!   let client = Client::new();
//!   client.register_handler(coordinator.handler());
//!   for url in ["https://example.com/a", "https://example.com/b"] {
//!       client.queue(Request::try_from(url)?, &dispatcher);
//!   }
//!
//!   for response in dispatcher.run().await {
//!       println!("{response}");
//!   }
//!   Ok(())
//! }
//! ```
//!
//! The coordinator only needs the two hooks a transport offers, a dispatch
//! hook and a completion hook, so it is not tied to [`Dispatcher`].
#![warn(clippy::all, clippy::pedantic)]
#![warn(
    absolute_paths_not_starting_with_crate,
    rustdoc::invalid_html_tags,
    missing_debug_implementations,
    semicolon_in_expressions_from_macros,
    unused_extern_crates,
    variant_size_differences,
    clippy::missing_const_for_fn
)]
#![deny(anonymous_parameters, macro_use_extern_crate)]

mod client;
mod handler;
mod transport;
mod types;
mod waiter;

pub mod attachment;
pub mod ratelimit;

pub use client::{CLIENT_KEY, Client};
pub use handler::{CompletionHook, DispatchHook, Handler};
pub use transport::{
    DEFAULT_MAX_CONCURRENCY, DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT, Dispatcher,
    DispatcherBuilder, Request, RequestId, Response,
};
pub use types::{ErrorKind, Result};
