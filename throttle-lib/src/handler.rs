//! Hooks into the life cycle of a request.
//!
//! A [`DispatchHook`] runs right before a request is sent and may delay it or
//! veto it. A [`CompletionHook`] runs after a response (or a transport
//! failure) arrived and passes on a possibly different response. A
//! [`Handler`] bundles at most one of each.
//!
//! Both traits are implemented for plain closures:
//!
//! ```
//! use throttle_lib::{Handler, Request, Response};
//!
//! let handler = Handler::new()
//!     .with_dispatch(|request: &Request| request.url().scheme() == "https")
//!     .with_completion(|response: Response| {
//!         log::info!("{response}");
//!         response
//!     });
//! assert!(handler.dispatch_hook().is_some());
//! assert!(handler.completion_hook().is_some());
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::{Request, Response};

/// Runs immediately before a request is dispatched
#[async_trait]
pub trait DispatchHook: Send + Sync {
    /// Decide whether `request` is sent.
    ///
    /// The hook may take as long as it likes before answering; the request
    /// occupies a dispatch slot in the meantime.
    async fn on_dispatch(&self, request: &Request) -> bool;
}

/// Runs once a request has completed, successfully or not
pub trait CompletionHook: Send + Sync {
    /// Inspect `response` and return the response handed to the next hook
    fn on_complete(&self, response: Response) -> Response;
}

#[async_trait]
impl<F> DispatchHook for F
where
    F: Fn(&Request) -> bool + Send + Sync,
{
    async fn on_dispatch(&self, request: &Request) -> bool {
        (self)(request)
    }
}

impl<F> CompletionHook for F
where
    F: Fn(Response) -> Response + Send + Sync,
{
    fn on_complete(&self, response: Response) -> Response {
        (self)(response)
    }
}

/// A pair of optional hooks, registered together on a [`Client`](crate::Client)
#[derive(Clone, Default)]
pub struct Handler {
    dispatch: Option<Arc<dyn DispatchHook>>,
    completion: Option<Arc<dyn CompletionHook>>,
}

impl Handler {
    /// A handler without any hooks
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a handler from already shared hooks
    #[must_use]
    pub fn from_parts(
        dispatch: Option<Arc<dyn DispatchHook>>,
        completion: Option<Arc<dyn CompletionHook>>,
    ) -> Self {
        Self {
            dispatch,
            completion,
        }
    }

    /// Set the dispatch hook, replacing any previous one
    #[must_use]
    pub fn with_dispatch<H: DispatchHook + 'static>(mut self, hook: H) -> Self {
        self.dispatch = Some(Arc::new(hook));
        self
    }

    /// Set the completion hook, replacing any previous one
    #[must_use]
    pub fn with_completion<H: CompletionHook + 'static>(mut self, hook: H) -> Self {
        self.completion = Some(Arc::new(hook));
        self
    }

    /// The dispatch hook, if any
    #[must_use]
    pub fn dispatch_hook(&self) -> Option<&Arc<dyn DispatchHook>> {
        self.dispatch.as_ref()
    }

    /// The completion hook, if any
    #[must_use]
    pub fn completion_hook(&self) -> Option<&Arc<dyn CompletionHook>> {
        self.completion.as_ref()
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("dispatch", &self.dispatch.is_some())
            .field("completion", &self.completion.is_some())
            .finish()
    }
}
