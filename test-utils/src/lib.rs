//! `test-utils` is used for testing in both `throttle-lib` and `throttle-bin`.
//! This crate does not depend on `throttle-lib` or `throttle-bin`, else we would get dependency cycles.
//! Macros are used instead, so that the importer is responsible for providing the dependencies.

/// Create a mock web server, which responds with a predefined status when
/// handling a matching request
#[macro_export]
macro_rules! mock_server {
    ($status:expr $(, $func:tt ($($arg:expr),*))*) => {{
        let mock_server = wiremock::MockServer::start().await;
        let response_template = wiremock::ResponseTemplate::new(http::StatusCode::from($status));
        let template = response_template$(.$func($($arg),*))*;
        wiremock::Mock::given(wiremock::matchers::method("GET")).respond_with(template).mount(&mock_server).await;
        mock_server
    }};
}

/// Set up a mock server which throttles the first `$times` requests.
///
/// Those requests are answered with `$status`, a `Retry-After: $retry_after`
/// header and a `Date` header stamped when the server is created. Every
/// later request gets `200 OK`.
#[macro_export]
macro_rules! throttling_mock_server {
    ($status:expr, $retry_after:expr, $times:expr $(,)?) => {{
        let mock_server = wiremock::MockServer::start().await;
        let date = httpdate::fmt_http_date(std::time::SystemTime::now());

        let throttled = wiremock::ResponseTemplate::new(http::StatusCode::from($status))
            .insert_header("Retry-After", $retry_after)
            .insert_header("Date", date.as_str());
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(throttled)
            .up_to_n_times($times)
            .with_priority(1)
            .mount(&mock_server)
            .await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(http::StatusCode::OK))
            .mount(&mock_server)
            .await;

        mock_server
    }};
}

/// Address a mock server under another host name, e.g. `localhost`
/// instead of `127.0.0.1`.
///
/// Cooldowns are keyed by host name without the port, so this is how tests
/// get two distinct hosts out of servers that all listen on the loopback
/// address.
#[macro_export]
macro_rules! host_url {
    ($host:expr, $server:expr $(,)?) => {{
        let mut url = url::Url::parse(&$server.uri()).expect("Expected valid mock server URL");
        url.set_host(Some($host)).expect("Expected valid host name");
        url
    }};
}
