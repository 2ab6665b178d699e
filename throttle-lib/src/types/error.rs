use thiserror::Error;
use url::Url;

/// Possible errors when interacting with `throttle_lib`
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Network error while building the client or executing a request
    #[error("Network error while trying to connect to an endpoint via reqwest")]
    NetworkRequest(#[source] reqwest::Error),
    /// The underlying HTTP client could not be created
    #[error("Error creating request client: {0}")]
    BuildRequestClient(#[source] reqwest::Error),
    /// Reading the body of a response failed
    #[error("Error reading response body: {0}")]
    ReadResponseBody(#[source] reqwest::Error),
    /// The given string can not be parsed into a valid URL
    #[error("Cannot parse string `{1}` as website url: {0}")]
    ParseUrl(#[source] url::ParseError, String),
    /// A URL without a host was found
    #[error("URL is missing a host")]
    InvalidUrlHost,
    /// The request URL cannot be handled by the transport
    #[error("Unsupported URL: {0}")]
    UnsupportedUrl(Url),
}

impl ErrorKind {
    /// Return more details about the given [`ErrorKind`]
    ///
    /// Which additional information we can extract depends on the underlying
    /// request type. The output is purely meant for humans and subject to change.
    #[must_use]
    pub fn details(&self) -> Option<String> {
        match self {
            ErrorKind::NetworkRequest(e) | ErrorKind::ReadResponseBody(e) => {
                if e.is_timeout() {
                    Some("Request timed out".to_string())
                } else if e.is_connect() {
                    Some("Connection failed".to_string())
                } else {
                    e.status().map(|status| status.to_string())
                }
            }
            _ => None,
        }
    }
}

impl PartialEq for ErrorKind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::NetworkRequest(e1), Self::NetworkRequest(e2))
            | (Self::BuildRequestClient(e1), Self::BuildRequestClient(e2))
            | (Self::ReadResponseBody(e1), Self::ReadResponseBody(e2)) => {
                e1.to_string() == e2.to_string()
            }
            (Self::ParseUrl(e1, s1), Self::ParseUrl(e2, s2)) => e1 == e2 && s1 == s2,
            (Self::UnsupportedUrl(u1), Self::UnsupportedUrl(u2)) => u1 == u2,
            (Self::InvalidUrlHost, Self::InvalidUrlHost) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ErrorKind;

    #[test]
    fn test_error_display() {
        assert_eq!(ErrorKind::InvalidUrlHost.to_string(), "URL is missing a host");

        let err = url::Url::parse("not a url").unwrap_err();
        let kind = ErrorKind::ParseUrl(err, "not a url".into());
        assert!(kind.to_string().contains("`not a url`"));
    }

    #[test]
    fn test_error_details() {
        assert_eq!(ErrorKind::InvalidUrlHost.details(), None);
    }
}
