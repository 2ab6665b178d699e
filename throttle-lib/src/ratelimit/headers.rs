//! Handle the `Retry-After` and `Date` response headers.
//!
//! `Retry-After` is specified in
//! [RFC 7231 section 7.1.3](https://www.rfc-editor.org/rfc/rfc7231#section-7.1.3)
//! as either a number of seconds or a date. A number of seconds is relative to
//! the moment the server generated the response, which is what the `Date`
//! header records. Both shapes are therefore normalized to an absolute point
//! in time before any two values are compared.

use chrono::DateTime;
use http::header::{DATE, RETRY_AFTER};
use http::{HeaderMap, HeaderValue};
use std::time::{Duration, SystemTime};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RetryAfterParseError {
    #[error("Unable to parse value '{0}'")]
    ValueError(String),

    #[error("Header value contains invalid chars")]
    HeaderValueError,
}

/// A parsed `Retry-After` value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAfter {
    /// Wait this long, counted from the response's `Date`
    Delay(Duration),
    /// Wait until this point in time
    At(SystemTime),
}

impl RetryAfter {
    /// Turn the value into an absolute point in time.
    ///
    /// A [`RetryAfter::Delay`] is added to `base`, and cannot be resolved
    /// without one.
    #[must_use]
    pub fn resolve(self, base: Option<SystemTime>) -> Option<SystemTime> {
        match self {
            RetryAfter::Delay(delay) => base.and_then(|base| base.checked_add(delay)),
            RetryAfter::At(at) => Some(at),
        }
    }
}

/// Parse a `Retry-After` value.
///
/// Non-negative integer seconds are tried first, then an RFC 2822 date.
/// Returns `None` if neither matches.
///
/// ```
/// use std::time::Duration;
/// use throttle_lib::ratelimit::{RetryAfter, parse_retry_after};
///
/// assert_eq!(parse_retry_after("42"), Some(RetryAfter::Delay(Duration::from_secs(42))));
/// assert!(matches!(
///     parse_retry_after("Wed, 13 Apr 2005 15:18:05 GMT"),
///     Some(RetryAfter::At(_))
/// ));
/// assert_eq!(parse_retry_after("garbage"), None);
/// ```
#[must_use]
pub fn parse_retry_after(value: &str) -> Option<RetryAfter> {
    try_parse_retry_after(value).ok()
}

/// Like [`parse_retry_after`], but reports why a value was rejected
///
/// # Errors
///
/// Returns [`RetryAfterParseError::ValueError`] if `value` is neither a
/// number of seconds nor a date.
pub fn try_parse_retry_after(value: &str) -> Result<RetryAfter, RetryAfterParseError> {
    let value = value.trim();

    value
        .parse::<u64>()
        .map(|secs| RetryAfter::Delay(Duration::from_secs(secs)))
        .or_else(|_| parse_date(value).map(RetryAfter::At))
}

/// Parse a `Retry-After` header value as received on the wire
///
/// # Errors
///
/// Returns [`RetryAfterParseError::HeaderValueError`] if the value is not
/// visible ASCII and [`RetryAfterParseError::ValueError`] if it cannot be
/// parsed.
pub fn parse_retry_after_header(value: &HeaderValue) -> Result<RetryAfter, RetryAfterParseError> {
    let value = value
        .to_str()
        .map_err(|_| RetryAfterParseError::HeaderValueError)?;
    try_parse_retry_after(value)
}

/// Parse an RFC 2822 date.
///
/// RFC 7231 requires recipients of HTTP dates to also accept the obsolete
/// RFC 850 and asctime forms, so those are tried last.
fn parse_date(value: &str) -> Result<SystemTime, RetryAfterParseError> {
    let value = value.trim();

    DateTime::parse_from_rfc2822(value)
        .map(SystemTime::from)
        .or_else(|_| httpdate::parse_http_date(value))
        .map_err(|_| RetryAfterParseError::ValueError(value.into()))
}

/// Compute the point in time after which a request may be retried.
///
/// `response_date` is the response's `Date` header and anchors any
/// `Retry-After` value given in seconds. Unparsable values are skipped, as
/// are second counts when there is no usable `Date`. The latest of the
/// remaining points in time wins.
pub fn compute_retry_at<I, S>(response_date: Option<&str>, retry_after: I) -> Option<SystemTime>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let base = response_date.and_then(|date| parse_date(date).ok());

    retry_after
        .into_iter()
        .filter_map(|value| parse_retry_after(value.as_ref()))
        .filter_map(|retry_after| retry_after.resolve(base))
        .max()
}

/// Apply [`compute_retry_at`] to the headers of a response.
///
/// All `Retry-After` values are considered, since the header may be repeated.
#[must_use]
pub fn retry_at_from_headers(headers: &HeaderMap) -> Option<SystemTime> {
    let date = headers.get(DATE).and_then(|value| value.to_str().ok());

    let values = headers
        .get_all(RETRY_AFTER)
        .iter()
        .filter_map(|value| match value.to_str() {
            Ok(value) => Some(value),
            Err(_) => {
                log::debug!(
                    "Ignoring Retry-After header: {}",
                    RetryAfterParseError::HeaderValueError
                );
                None
            }
        });

    compute_retry_at(date, values)
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use http::{HeaderMap, HeaderValue};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    /// Wed, 13 Apr 2005 15:18:05 GMT
    const DATE_SECS: u64 = 1_113_405_485;
    const DATE: &str = "Wed, 13 Apr 2005 15:18:05 GMT";

    fn at(offset: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(DATE_SECS + offset)
    }

    fn value(v: &str) -> HeaderValue {
        HeaderValue::from_str(v).unwrap()
    }

    #[test]
    fn test_retry_after() {
        assert_eq!(
            parse_retry_after("42"),
            Some(RetryAfter::Delay(Duration::from_secs(42)))
        );
        assert_eq!(parse_retry_after(DATE), Some(RetryAfter::At(at(0))));
        assert_eq!(parse_retry_after("garbage"), None);
    }

    #[rstest]
    #[case("0", RetryAfter::Delay(Duration::ZERO))]
    #[case(" 7 ", RetryAfter::Delay(Duration::from_secs(7)))]
    #[case("Wed, 13 Apr 2005 15:18:25 GMT", RetryAfter::At(at(20)))]
    #[case("13 Apr 2005 15:18:05 +0000", RetryAfter::At(at(0)))]
    #[case("Wed, 13 Apr 2005 17:18:05 +0200", RetryAfter::At(at(0)))]
    #[case("Wed Apr 13 15:18:05 2005", RetryAfter::At(at(0)))]
    fn test_parse_valid(#[case] input: &str, #[case] expected: RetryAfter) {
        assert_eq!(try_parse_retry_after(input), Ok(expected));
    }

    #[rstest]
    #[case("-1")]
    #[case("1.5")]
    #[case("")]
    #[case("soon")]
    #[case("Wed, 13 Foo 2005 15:18:05 GMT")]
    fn test_parse_invalid(#[case] input: &str) {
        assert_eq!(
            try_parse_retry_after(input),
            Err(RetryAfterParseError::ValueError(input.trim().into()))
        );
    }

    #[test]
    fn test_parse_header_invalid_chars() {
        let invalid = HeaderValue::from_bytes(b"\xff10").unwrap();
        assert_eq!(
            parse_retry_after_header(&invalid),
            Err(RetryAfterParseError::HeaderValueError)
        );
        assert_eq!(
            parse_retry_after_header(&value("3")),
            Ok(RetryAfter::Delay(Duration::from_secs(3)))
        );
    }

    #[test]
    fn test_resolve() {
        let delay = RetryAfter::Delay(Duration::from_secs(5));
        assert_eq!(delay.resolve(None), None);
        assert_eq!(delay.resolve(Some(at(0))), Some(at(5)));

        let absolute = RetryAfter::At(at(3));
        assert_eq!(absolute.resolve(None), Some(at(3)));
        assert_eq!(absolute.resolve(Some(at(100))), Some(at(3)));
    }

    #[test]
    fn test_compute_retry_at_with_date_and_seconds() {
        assert_eq!(compute_retry_at(Some(DATE), ["10"]), Some(at(10)));
    }

    #[test]
    fn test_compute_retry_at_without_date() {
        assert_eq!(compute_retry_at(None, ["10"]), None);
        assert_eq!(
            compute_retry_at(None, ["Wed, 13 Apr 2005 15:18:25 GMT"]),
            Some(at(20))
        );
    }

    #[test]
    fn test_compute_retry_at_picks_maximum() {
        assert_eq!(
            compute_retry_at(Some("Wed,13 Apr 2005 15:18:05 GMT"), ["10", "20"]),
            Some(at(20))
        );
        assert_eq!(
            compute_retry_at(
                Some(DATE),
                [
                    "Wed, 13 Apr 2005 15:18:15 GMT",
                    "Wed, 13 Apr 2005 15:18:25 GMT"
                ]
            ),
            Some(at(20))
        );
    }

    #[test]
    fn test_compute_retry_at_normalizes_mixed_values() {
        // 30 seconds after the response date beats a date 20 seconds after it,
        // even though the raw number is smaller than the raw timestamp
        assert_eq!(
            compute_retry_at(Some(DATE), ["30", "Wed, 13 Apr 2005 15:18:25 GMT"]),
            Some(at(30))
        );
        assert_eq!(
            compute_retry_at(Some(DATE), ["5", "Wed, 13 Apr 2005 15:18:25 GMT"]),
            Some(at(20))
        );
    }

    #[test]
    fn test_compute_retry_at_unparsable() {
        assert_eq!(compute_retry_at(Some(DATE), ["garbage"]), None);
        assert_eq!(compute_retry_at(Some(DATE), Vec::<String>::new()), None);
        assert_eq!(compute_retry_at(Some(DATE), ["garbage", "10"]), Some(at(10)));
        assert_eq!(compute_retry_at(Some("yesterday"), ["10"]), None);
    }

    #[test]
    fn test_retry_at_from_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_at_from_headers(&headers), None);

        headers.insert("date", value(DATE));
        headers.append("retry-after", value("10"));
        headers.append("Retry-After", value("20"));
        headers.append("retry-after", HeaderValue::from_bytes(b"\xff").unwrap());
        assert_eq!(retry_at_from_headers(&headers), Some(at(20)));
    }
}
