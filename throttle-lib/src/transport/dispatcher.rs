use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use futures::StreamExt;
use http::{HeaderMap, StatusCode};
use log::{debug, warn};
use tokio::sync::mpsc::{UnboundedSender, unbounded_channel};
use tokio_stream::wrappers::UnboundedReceiverStream;
use typed_builder::TypedBuilder;

use crate::attachment;
use crate::client::{CLIENT_KEY, Client};
use crate::handler::DispatchHook;
use crate::types::Result;
use crate::waiter::{WaitGroup, WaitGuard};
use crate::{ErrorKind, Request, RequestId, Response};

/// Default number of requests in flight at the same time
pub const DEFAULT_MAX_CONCURRENCY: usize = 128;

/// Default timeout for a single request
pub const DEFAULT_TIMEOUT_SECS: u64 = 20;

/// Default user agent, `throttle/<PKG_VERSION>`
pub const DEFAULT_USER_AGENT: &str = concat!("throttle/", env!("CARGO_PKG_VERSION"));

/// A request waiting in the queue of a running dispatcher
#[derive(Debug)]
pub(crate) struct Queued {
    pub(crate) request: Request,
    guard: WaitGuard,
}

/// Handle through which a request can re-enter the queue of a running
/// dispatcher.
///
/// Every handle carries a [`WaitGuard`], so a run does not finish while a
/// request that may still be requeued is around. Handles only live in the
/// dispatcher and in the [`Response`] passed through completion hooks, never
/// in a [`Request`], so copies of a request kept by a hook do not hold a run
/// open.
#[derive(Clone, Debug)]
pub(crate) struct QueueHandle {
    sender: UnboundedSender<Queued>,
    guard: WaitGuard,
}

impl QueueHandle {
    /// Queue `request`; it holds the run open until it has been executed
    pub(crate) fn send(&self, request: Request) -> bool {
        let queued = Queued {
            request,
            guard: self.guard.clone(),
        };
        self.sender.send(queued).is_ok()
    }
}

/// Builder for [`Dispatcher`].
///
/// See crate-level documentation for usage example.
#[derive(TypedBuilder, Debug, Clone)]
#[builder(field_defaults(default, setter(into)))]
#[builder(builder_method(doc = "
Create a builder for building a `Dispatcher`.

On the builder call, call methods with same name as its fields to set their
values.

Finally, call `.build()` to create the instance of `DispatcherBuilder`
and `.dispatcher()` to create the `Dispatcher` itself.
"))]
pub struct DispatcherBuilder {
    /// Maximum number of requests in flight at the same time.
    ///
    /// Requests waiting in a dispatch hook count towards this limit.
    #[builder(default = DEFAULT_MAX_CONCURRENCY)]
    max_concurrency: usize,

    /// Timeout for a single request, including reading its body.
    #[builder(default = Duration::from_secs(DEFAULT_TIMEOUT_SECS))]
    timeout: Duration,

    /// User agent sent with every request.
    #[builder(default = String::from(DEFAULT_USER_AGENT))]
    user_agent: String,
}

impl Default for DispatcherBuilder {
    #[inline]
    fn default() -> Self {
        Self::builder().build()
    }
}

impl DispatcherBuilder {
    /// Instantiates a [`Dispatcher`].
    ///
    /// # Errors
    ///
    /// Returns an `Err` if the underlying HTTP client cannot be created,
    /// e.g. when no TLS backend is available.
    pub fn dispatcher(self) -> Result<Dispatcher> {
        let reqwest_client = reqwest::ClientBuilder::new()
            .timeout(self.timeout)
            .user_agent(self.user_agent)
            .build()
            .map_err(ErrorKind::BuildRequestClient)?;

        Ok(Dispatcher {
            reqwest_client,
            max_concurrency: self.max_concurrency,
            dispatch_hooks: Arc::default(),
            pending: Arc::default(),
        })
    }
}

/// Sends batches of requests in parallel.
///
/// Before a request goes out, every hook registered with
/// [`Dispatcher::register_dispatch_hook`] runs, followed by the dispatch hooks
/// of the [`Client`] that submitted it. After the exchange, the request's own
/// completion hooks run in order.
#[derive(Clone)]
pub struct Dispatcher {
    /// Underlying `reqwest` client instance that handles the HTTP requests.
    reqwest_client: reqwest::Client,
    /// Maximum number of requests in flight.
    max_concurrency: usize,
    /// Hooks run before every request, in registration order.
    dispatch_hooks: Arc<RwLock<Vec<Arc<dyn DispatchHook>>>>,
    /// Requests queued before [`Dispatcher::run`].
    pending: Arc<Mutex<Vec<Request>>>,
}

impl Dispatcher {
    /// Register a hook that runs before every request this dispatcher sends
    pub fn register_dispatch_hook(&self, hook: Arc<dyn DispatchHook>) {
        self.dispatch_hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(hook);
    }

    /// Add a request to the next run
    pub fn queue(&self, request: Request) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
    }

    /// Number of requests waiting for the next run
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Maximum number of requests in flight
    #[must_use]
    pub const fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Send all queued requests and wait for them to finish.
    ///
    /// Requests requeued by completion hooks are sent again within the same
    /// run. The result holds the final response of every request that was
    /// not vetoed by a dispatch hook, ordered by [`RequestId`].
    pub async fn run(&self) -> Vec<Response> {
        let requests = std::mem::take(
            &mut *self
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );

        let (waiter, guard) = WaitGroup::new();
        let (sender, receiver) = unbounded_channel();
        let queue = QueueHandle {
            sender: sender.clone(),
            guard,
        };
        for request in requests {
            queue.send(request);
        }
        // From here on only queued requests keep the run alive
        drop(queue);

        let results = Mutex::new(BTreeMap::new());
        let results_ref = &results;
        let sender = &sender;
        UnboundedReceiverStream::new(receiver)
            .take_until(waiter.wait())
            .for_each_concurrent(self.max_concurrency, |Queued { request, guard }| async move {
                let queue = QueueHandle {
                    sender: sender.clone(),
                    guard,
                };
                if let Some(response) = self.execute(request, queue).await {
                    record(results_ref, response);
                }
            })
            .await;

        results
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .into_values()
            .collect()
    }

    /// Run dispatch hooks, the HTTP exchange, and completion hooks for one request.
    ///
    /// `queue` keeps the run open until the completion hooks are done. Every
    /// hook gets a response that can requeue, including one built by the
    /// previous hook.
    async fn execute(&self, request: Request, queue: QueueHandle) -> Option<Response> {
        if !self.allows_dispatch(&request).await {
            debug!("Dispatch of {request} vetoed by hook");
            return None;
        }

        let hooks = request.completion_hooks().to_vec();
        let exchanged = self.exchange(&request).await;
        let mut response = match exchanged {
            Ok((status, headers, body)) => Response::new(request, status, headers, body),
            Err(e) => {
                warn!("Request {request} failed: {e}");
                Response::failed(request, e)
            }
        };
        debug!("{response}");

        for hook in hooks {
            response.attach_queue(queue.clone());
            response = hook.on_complete(response);
        }

        response.detach_queue();
        Some(response)
    }

    async fn allows_dispatch(&self, request: &Request) -> bool {
        let hooks = self
            .dispatch_hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for hook in hooks {
            if !hook.on_dispatch(request).await {
                return false;
            }
        }

        match attachment::read(request).and_then(|data| data.get::<Client>(CLIENT_KEY)) {
            Some(client) => client.allows_dispatch(request).await,
            None => true,
        }
    }

    async fn exchange(&self, request: &Request) -> Result<(StatusCode, HeaderMap, Vec<u8>)> {
        if !matches!(request.url().scheme(), "http" | "https") {
            return Err(ErrorKind::UnsupportedUrl(request.url().clone()));
        }

        let reqwest_request = request
            .to_reqwest(&self.reqwest_client)
            .map_err(ErrorKind::NetworkRequest)?;
        let response = self
            .reqwest_client
            .execute(reqwest_request)
            .await
            .map_err(ErrorKind::NetworkRequest)?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(ErrorKind::ReadResponseBody)?;

        Ok((status, headers, body.to_vec()))
    }
}

/// Keep the response of the latest attempt of each request
fn record(results: &Mutex<BTreeMap<RequestId, Response>>, response: Response) {
    let mut results = results.lock().unwrap_or_else(PoisonError::into_inner);
    match results.entry(response.request().id()) {
        Entry::Vacant(entry) => {
            entry.insert(response);
        }
        Entry::Occupied(mut entry) => {
            if response.request().attempt() >= entry.get().request().attempt() {
                entry.insert(response);
            }
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("max_concurrency", &self.max_concurrency)
            .field(
                "dispatch_hooks",
                &self
                    .dispatch_hooks
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .len(),
            )
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}
