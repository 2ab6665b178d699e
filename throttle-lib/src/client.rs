//! Batch client wiring [`Handler`]s onto the requests it submits.
//!
//! A [`Client`] collects the hooks of every registered handler. Submitting a
//! request puts the client's completion hooks in front of the request's own
//! hooks and attaches the client to the request under [`CLIENT_KEY`], which is
//! how the [`Dispatcher`](crate::Dispatcher) finds the client's dispatch hooks.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use log::debug;

use crate::attachment::{self, Attachments};
use crate::handler::{CompletionHook, DispatchHook};
use crate::{Dispatcher, Handler, Request};

/// Attachment key under which a submitted request refers to its [`Client`]
pub const CLIENT_KEY: &str = "client";

/// Composes the hooks of many handlers.
///
/// Clones share their state: a handler registered on one clone is seen by
/// all of them, including requests submitted earlier when it comes to
/// dispatch hooks. Completion hooks are copied onto a request at submission.
#[derive(Clone, Default)]
pub struct Client {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    dispatch_hooks: RwLock<Vec<Arc<dyn DispatchHook>>>,
    completion_hooks: RwLock<Vec<Arc<dyn CompletionHook>>>,
}

impl Client {
    /// A client without handlers
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the hooks of `handler` after those of previously registered handlers
    pub fn register_handler(&self, handler: Handler) {
        if let Some(hook) = handler.dispatch_hook() {
            self.inner
                .dispatch_hooks
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .push(hook.clone());
        }
        if let Some(hook) = handler.completion_hook() {
            self.inner
                .completion_hooks
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .push(hook.clone());
        }
    }

    /// Prepare `request` for dispatch through this client.
    ///
    /// The client's completion hooks are inserted before any hook already on
    /// the request, in registration order, and the client is attached to the
    /// request under [`CLIENT_KEY`].
    ///
    /// Submitting the same request twice inserts the hooks twice.
    pub fn submit(&self, request: &mut Request) {
        let mut hooks = self
            .inner
            .completion_hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let existing = request.completion_hooks_mut();
        hooks.append(existing);
        *existing = hooks;

        attachment::attach(request, Attachments::new().with(CLIENT_KEY, self.clone()));
    }

    /// Submit `request` and queue it on `dispatcher`
    pub fn queue(&self, mut request: Request, dispatcher: &Dispatcher) {
        self.submit(&mut request);
        dispatcher.queue(request);
    }

    /// Number of registered dispatch hooks
    #[must_use]
    pub fn dispatch_hook_count(&self) -> usize {
        self.inner
            .dispatch_hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of registered completion hooks
    #[must_use]
    pub fn completion_hook_count(&self) -> usize {
        self.inner
            .completion_hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Run the dispatch hooks in registration order; the first `false` wins
    pub(crate) async fn allows_dispatch(&self, request: &Request) -> bool {
        let hooks = self
            .inner
            .dispatch_hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for hook in hooks {
            if !hook.on_dispatch(request).await {
                debug!("Client handler vetoed {request}");
                return false;
            }
        }
        true
    }
}

impl PartialEq for Client {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Client {}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("dispatch_hooks", &self.dispatch_hook_count())
            .field("completion_hooks", &self.completion_hook_count())
            .finish()
    }
}
