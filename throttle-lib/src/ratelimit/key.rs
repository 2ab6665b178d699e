use std::fmt;
use url::Url;

use crate::ErrorKind;
use crate::types::Result;

/// A type-safe representation of a hostname for throttling purposes.
///
/// This extracts and normalizes hostnames from URLs so that every request to
/// the same host (domain or IP address) shares one cooldown. Ports are not
/// part of the key: a server rate-limits by name, not by listening socket.
///
/// # Examples
///
/// ```
/// use throttle_lib::ratelimit::HostKey;
/// use url::Url;
///
/// let url = Url::parse("https://api.github.com/repos/user/repo").unwrap();
/// let host_key = HostKey::try_from(&url).unwrap();
/// assert_eq!(host_key.as_str(), "api.github.com");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostKey(String);

impl HostKey {
    /// Get the hostname as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&Url> for HostKey {
    type Error = ErrorKind;

    fn try_from(url: &Url) -> Result<Self> {
        let host = url.host_str().ok_or(ErrorKind::InvalidUrlHost)?;

        // Normalize to lowercase for consistent lookup
        Ok(HostKey(host.to_lowercase()))
    }
}

impl fmt::Display for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for HostKey {
    fn from(host: &str) -> Self {
        HostKey(host.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_key_from_url() {
        let url = Url::parse("https://api.github.com/repos/user/repo").unwrap();
        let host_key = HostKey::try_from(&url).unwrap();
        assert_eq!(host_key.as_str(), "api.github.com");
    }

    #[test]
    fn test_host_key_normalization() {
        let url = Url::parse("https://API.GITHUB.COM/repos/user/repo").unwrap();
        let host_key = HostKey::try_from(&url).unwrap();
        assert_eq!(host_key.as_str(), "api.github.com");
    }

    #[test]
    fn test_host_key_ignores_port() {
        let a = Url::parse("http://127.0.0.1:9462/test_retry").unwrap();
        let b = Url::parse("http://127.0.0.1:8080/").unwrap();
        assert_eq!(HostKey::try_from(&a).unwrap(), HostKey::try_from(&b).unwrap());
        assert_eq!(HostKey::try_from(&a).unwrap().as_str(), "127.0.0.1");
    }

    #[test]
    fn test_host_key_no_host() {
        let url = Url::parse("file:///path/to/file").unwrap();
        assert_eq!(HostKey::try_from(&url), Err(ErrorKind::InvalidUrlHost));

        let url = Url::parse("mailto:someone@example.com").unwrap();
        assert!(HostKey::try_from(&url).is_err());
    }

    #[test]
    fn test_host_key_display() {
        let host_key = HostKey::from("EXAMPLE.com");
        assert_eq!(format!("{host_key}"), "example.com");
    }
}
