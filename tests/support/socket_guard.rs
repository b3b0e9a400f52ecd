//! Skips wiremock tests on hosts that cannot bind a localhost socket.
//!
//! Set `ALBUMDL_REQUIRE_SOCKET_TESTS=1` in CI to turn a skip into a failure.

use std::net::TcpListener;
use std::panic::Location;

const REQUIRE_SOCKET_TESTS_ENV: &str = "ALBUMDL_REQUIRE_SOCKET_TESTS";

fn socket_tests_required() -> bool {
    std::env::var(REQUIRE_SOCKET_TESTS_ENV).is_ok_and(|value| {
        matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes"
        )
    })
}

/// True when the calling test should be skipped for lack of sockets.
///
/// Panics instead when the environment requires socket tests to run.
#[track_caller]
#[must_use]
pub fn skip_without_sockets() -> bool {
    if TcpListener::bind(("127.0.0.1", 0)).is_ok() {
        return false;
    }

    let caller = Location::caller();
    assert!(
        !socket_tests_required(),
        "[socket-bound-test] {caller}: localhost cannot be bound and {REQUIRE_SOCKET_TESTS_ENV} is set"
    );
    eprintln!("[socket-bound-test] {caller}: localhost cannot be bound, skipping");
    true
}

/// Starts a mock server, or returns `Ok(())` from the calling test when
/// sockets are unavailable.
macro_rules! require_mock_server {
    () => {{
        if $crate::support::socket_guard::skip_without_sockets() {
            return Ok(());
        }
        ::wiremock::MockServer::start().await
    }};
}
pub(crate) use require_mock_server;
