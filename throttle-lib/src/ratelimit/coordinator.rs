use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use log::debug;

use crate::handler::{CompletionHook, DispatchHook};
use crate::ratelimit::{CooldownTimer, HostKey, ThrottleConfig, retry_at_from_headers};
use crate::{Dispatcher, Handler, Request, Response};

/// Keeps track of the cooldown each host asked for.
///
/// The `ThrottleCoordinator` holds at most one [`CooldownTimer`] per host.
/// As a dispatch hook it holds back requests to a host until that host's
/// timer has elapsed. As a completion hook it reads `Retry-After` from
/// throttling responses (by default `429` and `503`), installs a timer and
/// sends the request again.
///
/// # Architecture
///
/// - Timers are created when a server asks for a cooldown, never up front
/// - A single mutex guards the table; nobody waits while holding it
/// - A pending timer is never replaced, so a host is never held back longer
///   than the first pending cooldown says
/// - Every failure (missing host, unparsable header) lets the request pass
///
/// # Examples
///
/// ```no_run
/// use throttle_lib::ratelimit::{ThrottleConfig, ThrottleCoordinator};
/// use throttle_lib::{Client, DispatcherBuilder, Request};
///
/// # #[tokio::main]
/// # async fn main() -> throttle_lib::Result<()> {
/// let dispatcher = DispatcherBuilder::default().dispatcher()?;
/// let coordinator = ThrottleCoordinator::install(ThrottleConfig::default(), &dispatcher);
///
/// let client = Client::new();
/// client.register_handler(coordinator.handler());
///
/// let mut request = Request::try_from("https://example.com")?;
/// client.submit(&mut request);
/// dispatcher.queue(request);
///
/// for response in dispatcher.run().await {
///     println!("{response}");
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ThrottleCoordinator {
    config: ThrottleConfig,

    /// The current timer of each host
    timers: Mutex<HashMap<HostKey, CooldownTimer>>,
}

impl ThrottleCoordinator {
    /// Create a coordinator which is not yet hooked into a dispatcher
    #[must_use]
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            timers: Mutex::default(),
        }
    }

    /// Create a coordinator and register it as a dispatch hook of `dispatcher`.
    ///
    /// The completion side still has to be wired onto requests, usually by
    /// registering [`ThrottleCoordinator::handler`] with a [`Client`](crate::Client).
    #[must_use]
    pub fn install(config: ThrottleConfig, dispatcher: &Dispatcher) -> Arc<Self> {
        let coordinator = Arc::new(Self::new(config));
        dispatcher.register_dispatch_hook(coordinator.clone());
        coordinator
    }

    /// A handler carrying only the completion side of this coordinator.
    ///
    /// The dispatch side is registered globally by
    /// [`ThrottleCoordinator::install`], so it is not repeated here.
    #[must_use]
    pub fn handler(self: &Arc<Self>) -> Handler {
        let completion: Arc<dyn CompletionHook> = self.clone();
        Handler::from_parts(None, Some(completion))
    }

    /// The configuration this coordinator was created with
    #[must_use]
    pub const fn config(&self) -> &ThrottleConfig {
        &self.config
    }

    /// Install a cooldown for `host` lasting until `retry_at` plus the safety
    /// margin, and return the timer now in effect.
    ///
    /// An existing timer is kept while it is pending, or if it elapsed at or
    /// after `retry_at`. In that case the existing timer is returned and no
    /// new one is created.
    ///
    /// A timer whose runtime shut down before it elapsed counts as elapsed.
    ///
    /// # Panics
    ///
    /// Panics if a new timer is needed outside of a Tokio runtime
    pub fn set_timer(&self, host: &HostKey, retry_at: SystemTime) -> CooldownTimer {
        let mut timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(timer) = timers.get(host)
            && (!timer.is_elapsed() || timer.deadline() >= retry_at)
        {
            debug!("Keeping cooldown of {host} until {:?}", timer.deadline());
            return timer.clone();
        }

        let delay = retry_at
            .duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO)
            .saturating_add(self.config.safety_margin);
        let timer = CooldownTimer::schedule(delay);
        debug!("Cooling down {host} for {delay:?}");
        timers.insert(host.clone(), timer.clone());
        timer
    }

    /// Wait until the cooldown of `host` is over.
    ///
    /// Returns immediately if the host has no pending cooldown.
    pub async fn wait_for(&self, host: &HostKey) {
        let Some(timer) = self.get_timer(host) else {
            return;
        };

        if !timer.is_elapsed() {
            debug!("Waiting {:?} for cooldown of {host}", timer.remaining());
            timer.wait().await;
        }
    }

    /// The current timer of `host`, pending or elapsed
    #[must_use]
    pub fn get_timer(&self, host: &HostKey) -> Option<CooldownTimer> {
        self.timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(host)
            .cloned()
    }

    /// Number of hosts a cooldown was ever installed for
    #[must_use]
    pub fn host_count(&self) -> usize {
        self.timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl DispatchHook for ThrottleCoordinator {
    async fn on_dispatch(&self, request: &Request) -> bool {
        match HostKey::try_from(request.url()) {
            Ok(host) => self.wait_for(&host).await,
            Err(e) => debug!("Not throttling {request}: {e}"),
        }
        true
    }
}

impl CompletionHook for ThrottleCoordinator {
    fn on_complete(&self, response: Response) -> Response {
        let Some(status) = response.status() else {
            return response;
        };
        if !self.config.is_retry_status(status) {
            return response;
        }

        let Some(retry_at) = retry_at_from_headers(response.headers()) else {
            debug!("{response} carries no usable Retry-After, not throttling");
            return response;
        };

        let host = match HostKey::try_from(response.request().url()) {
            Ok(host) => host,
            Err(e) => {
                debug!("Not throttling {response}: {e}");
                return response;
            }
        };

        self.set_timer(&host, retry_at);
        if !response.requeue() {
            debug!("Could not requeue {}", response.request());
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use http::header::{DATE, RETRY_AFTER};
    use http::{HeaderMap, HeaderValue, StatusCode};
    use tokio::sync::Barrier;
    use tokio::time::Instant;

    fn host() -> HostKey {
        HostKey::from("a.test")
    }

    fn coordinator_without_margin() -> ThrottleCoordinator {
        ThrottleCoordinator::new(ThrottleConfig::from_options(vec![], Some(Duration::ZERO)))
    }

    fn throttled(url: &str, status: StatusCode, retry_after: &str) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            DATE,
            HeaderValue::from_str(&httpdate::fmt_http_date(SystemTime::now())).unwrap(),
        );
        headers.insert(RETRY_AFTER, HeaderValue::from_str(retry_after).unwrap());
        Response::new(Request::try_from(url).unwrap(), status, headers, Vec::new())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_set_timer_creates_one_timer() {
        let coordinator = Arc::new(ThrottleCoordinator::default());
        let retry_at = SystemTime::now() + Duration::from_secs(5);
        let barrier = Arc::new(Barrier::new(16));

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let coordinator = coordinator.clone();
                let barrier = barrier.clone();
                let retry_at = retry_at + Duration::from_millis(i);
                tokio::spawn(async move {
                    barrier.wait().await;
                    coordinator.set_timer(&host(), retry_at)
                })
            })
            .collect();

        let mut timers = Vec::new();
        for task in tasks {
            timers.push(task.await.unwrap());
        }

        assert!(timers.windows(2).all(|pair| pair[0] == pair[1]));
        assert_eq!(coordinator.get_timer(&host()).as_ref(), timers.first());
        assert_eq!(coordinator.host_count(), 1);
    }

    #[test]
    fn test_timer_of_stopped_runtime_is_replaced() {
        let coordinator = ThrottleCoordinator::default();
        let runtime = || {
            tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap()
        };

        let first_runtime = runtime();
        let first = first_runtime.block_on(async {
            coordinator.set_timer(&host(), SystemTime::now() + Duration::from_secs(60))
        });
        assert!(!first.is_elapsed());
        drop(first_runtime);
        assert!(first.is_elapsed());

        let second = runtime().block_on(async {
            coordinator.set_timer(&host(), SystemTime::now() + Duration::from_secs(120))
        });
        assert_ne!(first, second);
        assert_eq!(coordinator.get_timer(&host()), Some(second));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_without_timer_returns_immediately() {
        let coordinator = ThrottleCoordinator::default();
        let start = Instant::now();
        coordinator.wait_for(&host()).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(coordinator.get_timer(&host()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_waits_until_deadline() {
        let coordinator = ThrottleCoordinator::default();
        let timer = coordinator.set_timer(&host(), SystemTime::now() + Duration::from_secs(2));

        let start = Instant::now();
        coordinator.wait_for(&host()).await;

        // Two seconds plus the default margin, minus the time spent
        // between reading the clock and scheduling the timer
        assert!(start.elapsed() >= Duration::from_millis(2_900));
        assert!(timer.is_elapsed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_ignores_other_hosts() {
        let coordinator = ThrottleCoordinator::default();
        coordinator.set_timer(&host(), SystemTime::now() + Duration::from_secs(30));

        let start = Instant::now();
        coordinator.wait_for(&HostKey::from("b.test")).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_timer_is_never_extended() {
        let coordinator = coordinator_without_margin();
        let now = SystemTime::now();

        let first = coordinator.set_timer(&host(), now + Duration::from_secs(2));
        let second = coordinator.set_timer(&host(), now + Duration::from_secs(60));
        assert_eq!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_timer_is_replaced_by_later_deadline() {
        let coordinator = coordinator_without_margin();
        let now = SystemTime::now();

        let first = coordinator.set_timer(&host(), now + Duration::from_secs(1));
        first.wait().await;

        // An earlier deadline does not replace the elapsed timer
        let kept = coordinator.set_timer(&host(), now);
        assert_eq!(kept, first);

        let replaced = coordinator.set_timer(&host(), now + Duration::from_secs(10));
        assert_ne!(replaced, first);
        assert!(!replaced.is_elapsed());
        assert_eq!(coordinator.get_timer(&host()), Some(replaced));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_at_in_the_past_only_waits_for_margin() {
        let coordinator = ThrottleCoordinator::default();
        coordinator.set_timer(&host(), SystemTime::now() - Duration::from_secs(30));

        let start = Instant::now();
        coordinator.wait_for(&host()).await;
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_dispatch_waits_for_host() {
        let coordinator = ThrottleCoordinator::default();
        coordinator.set_timer(&host(), SystemTime::now() + Duration::from_secs(4));

        let start = Instant::now();
        let request = Request::try_from("https://A.test/path").unwrap();
        assert!(coordinator.on_dispatch(&request).await);
        assert!(start.elapsed() >= Duration::from_millis(4_900));
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_dispatch_without_host_passes() {
        let coordinator = ThrottleCoordinator::default();
        let request = Request::try_from("data:text/plain,hello").unwrap();
        assert!(coordinator.on_dispatch(&request).await);
    }

    #[tokio::test]
    async fn test_on_complete_installs_timer() {
        let coordinator = ThrottleCoordinator::default();
        let response = throttled("https://a.test/", StatusCode::SERVICE_UNAVAILABLE, "2");
        let id = response.request().id();

        let response = coordinator.on_complete(response);
        assert_eq!(response.request().id(), id);
        assert_eq!(response.status(), Some(StatusCode::SERVICE_UNAVAILABLE));

        // `Date` has second precision, so the deadline lies within
        // (now + 2s, now + 3s]
        let timer = coordinator.get_timer(&host()).unwrap();
        assert!(!timer.is_elapsed());
        assert!(timer.remaining() > Duration::from_secs(1));
        assert!(timer.remaining() <= Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_on_complete_ignores_other_statuses() {
        let coordinator = ThrottleCoordinator::default();
        coordinator.on_complete(throttled("https://a.test/", StatusCode::OK, "2"));
        coordinator.on_complete(throttled(
            "https://a.test/",
            StatusCode::INTERNAL_SERVER_ERROR,
            "2",
        ));
        assert!(coordinator.get_timer(&host()).is_none());
    }

    #[tokio::test]
    async fn test_on_complete_uses_configured_statuses() {
        let coordinator = ThrottleCoordinator::new(ThrottleConfig::from_options(vec![500], None));
        coordinator.on_complete(throttled("https://a.test/", StatusCode::TOO_MANY_REQUESTS, "2"));
        assert!(coordinator.get_timer(&host()).is_none());

        coordinator.on_complete(throttled(
            "https://a.test/",
            StatusCode::INTERNAL_SERVER_ERROR,
            "2",
        ));
        assert!(coordinator.get_timer(&host()).is_some());
    }

    #[tokio::test]
    async fn test_on_complete_without_usable_headers() {
        let coordinator = ThrottleCoordinator::default();

        let garbage = throttled("https://a.test/", StatusCode::TOO_MANY_REQUESTS, "soon");
        coordinator.on_complete(garbage);

        let missing = Response::new(
            Request::try_from("https://a.test/").unwrap(),
            StatusCode::TOO_MANY_REQUESTS,
            HeaderMap::new(),
            Vec::new(),
        );
        coordinator.on_complete(missing);

        assert!(coordinator.get_timer(&host()).is_none());
    }

    #[tokio::test]
    async fn test_on_complete_ignores_failed_requests() {
        let coordinator = ThrottleCoordinator::default();
        let failed = Response::failed(
            Request::try_from("https://a.test/").unwrap(),
            crate::ErrorKind::InvalidUrlHost,
        );
        let failed = coordinator.on_complete(failed);
        assert!(failed.error().is_some());
        assert_eq!(coordinator.host_count(), 0);
    }

    #[tokio::test]
    async fn test_handler_only_completes() {
        let coordinator = Arc::new(ThrottleCoordinator::default());
        let handler = coordinator.handler();
        assert!(handler.dispatch_hook().is_none());
        assert!(handler.completion_hook().is_some());
    }

    #[test]
    fn test_install_registers_dispatch_hook() {
        let dispatcher = crate::DispatcherBuilder::default().dispatcher().unwrap();
        let coordinator = ThrottleCoordinator::install(ThrottleConfig::default(), &dispatcher);
        assert_eq!(coordinator.config(), &ThrottleConfig::default());
        assert_eq!(Arc::strong_count(&coordinator), 2);
    }
}
