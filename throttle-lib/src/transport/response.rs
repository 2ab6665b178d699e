use std::borrow::Cow;
use std::fmt;

use http::{HeaderMap, StatusCode};

use crate::ErrorKind;
use crate::Request;
use crate::attachment::{Attachable, Attachments};
use crate::transport::QueueHandle;

/// The outcome of dispatching a [`Request`].
///
/// A response always refers back to the request that produced it. When the
/// transport failed before a status line arrived, there is no status and
/// [`Response::error`] says what went wrong.
pub struct Response {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Vec<u8>,
    error: Option<ErrorKind>,
    request: Request,
    attachments: Option<Attachments>,
    /// Set by the dispatcher while completion hooks run
    queue: Option<QueueHandle>,
}

impl Response {
    /// A response as received from a server
    #[must_use]
    pub fn new(request: Request, status: StatusCode, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self {
            status: Some(status),
            headers,
            body,
            error: None,
            request,
            attachments: None,
            queue: None,
        }
    }

    /// A request that could not be completed
    #[must_use]
    pub fn failed(request: Request, error: ErrorKind) -> Self {
        Self {
            status: None,
            headers: HeaderMap::new(),
            body: Vec::new(),
            error: Some(error),
            request,
            attachments: None,
            queue: None,
        }
    }

    /// Status code, unless the transport failed
    #[must_use]
    pub const fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Response headers; names are case-insensitive and may repeat
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Raw response body
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Response body decoded as UTF-8, replacing invalid sequences
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Transport failure, if any
    #[must_use]
    pub const fn error(&self) -> Option<&ErrorKind> {
        self.error.as_ref()
    }

    /// The request this response belongs to
    #[must_use]
    pub const fn request(&self) -> &Request {
        &self.request
    }

    /// Whether a 2xx status was received
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_some_and(|status| status.is_success())
    }

    /// Put a copy of the originating request back into the queue of the
    /// dispatcher that produced this response.
    ///
    /// The copy keeps id, hooks and attachments; its attempt count goes up
    /// by one. This only works from within a completion hook; afterwards,
    /// or for a response that did not come from a running dispatcher, it
    /// returns `false`.
    pub fn requeue(&self) -> bool {
        let Some(queue) = &self.queue else {
            return false;
        };
        queue.send(self.request.next_attempt())
    }

    pub(crate) fn attach_queue(&mut self, queue: QueueHandle) {
        self.queue = Some(queue);
    }

    /// Drop the dispatcher's handle once the request can no longer be requeued
    pub(crate) fn detach_queue(&mut self) {
        self.queue = None;
    }
}

impl Attachable for Response {
    fn attachments(&self) -> Option<&Attachments> {
        self.attachments.as_ref()
    }

    fn attachments_slot(&mut self) -> &mut Option<Attachments> {
        &mut self.attachments
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.status, &self.error) {
            (Some(status), _) => write!(f, "{} {}", status.as_u16(), self.request.url()),
            (None, Some(error)) => write!(f, "ERR {} ({error})", self.request.url()),
            (None, None) => write!(f, "ERR {}", self.request.url()),
        }
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .field("error", &self.error)
            .field("request", &self.request)
            .field("attachments", &self.attachments)
            .finish_non_exhaustive()
    }
}
