use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use http::{HeaderMap, Method};
use url::Url;

use crate::ErrorKind;
use crate::attachment::{Attachable, Attachments};
use crate::handler::CompletionHook;
use crate::types::Result;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a [`Request`].
///
/// A requeued request keeps its id, so all attempts of one request share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(u64);

impl RequestId {
    fn next() -> Self {
        RequestId(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A request to be sent by the [`Dispatcher`](crate::Dispatcher)
#[derive(Clone)]
pub struct Request {
    id: RequestId,
    attempt: u32,
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<Vec<u8>>,
    completion_hooks: Vec<Arc<dyn CompletionHook>>,
    attachments: Option<Attachments>,
}

impl Request {
    /// Create a request without headers, body or hooks
    #[must_use]
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            id: RequestId::next(),
            attempt: 1,
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            completion_hooks: Vec::new(),
            attachments: None,
        }
    }

    /// Identity shared by all attempts of this request
    #[must_use]
    pub const fn id(&self) -> RequestId {
        self.id
    }

    /// How often this request has been dispatched so far, starting at 1
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// HTTP method
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Target URL
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Request headers
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable access to the request headers
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Request body
    #[must_use]
    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Set the request body
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Hooks run in order once this request completes
    #[must_use]
    pub fn completion_hooks(&self) -> &[Arc<dyn CompletionHook>] {
        &self.completion_hooks
    }

    /// Mutable access to the completion hooks
    pub fn completion_hooks_mut(&mut self) -> &mut Vec<Arc<dyn CompletionHook>> {
        &mut self.completion_hooks
    }

    /// Append a completion hook
    pub fn on_complete<H: CompletionHook + 'static>(&mut self, hook: H) {
        self.completion_hooks.push(Arc::new(hook));
    }

    /// A copy for the next attempt, keeping id, hooks and attachments
    pub(crate) fn next_attempt(&self) -> Self {
        let mut request = self.clone();
        request.attempt += 1;
        request
    }

    pub(crate) fn to_reqwest(
        &self,
        client: &reqwest::Client,
    ) -> std::result::Result<reqwest::Request, reqwest::Error> {
        let mut builder = client
            .request(self.method.clone(), self.url.clone())
            .headers(self.headers.clone());
        if let Some(body) = &self.body {
            builder = builder.body(body.clone());
        }
        builder.build()
    }
}

impl Attachable for Request {
    fn attachments(&self) -> Option<&Attachments> {
        self.attachments.as_ref()
    }

    fn attachments_slot(&mut self) -> &mut Option<Attachments> {
        &mut self.attachments
    }
}

impl From<Url> for Request {
    fn from(url: Url) -> Self {
        Request::new(Method::GET, url)
    }
}

impl TryFrom<&str> for Request {
    type Error = ErrorKind;

    fn try_from(url: &str) -> Result<Self> {
        let parsed = Url::parse(url.trim()).map_err(|e| ErrorKind::ParseUrl(e, url.to_string()))?;
        Ok(Request::from(parsed))
    }
}

impl TryFrom<String> for Request {
    type Error = ErrorKind;

    fn try_from(url: String) -> Result<Self> {
        Request::try_from(url.as_str())
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("attempt", &self.attempt)
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("completion_hooks", &self.completion_hooks.len())
            .field("attachments", &self.attachments)
            .finish_non_exhaustive()
    }
}
