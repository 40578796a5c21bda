//! Integration Test: No Blocking on the Runtime
//!
//! **Policy**: The painter runs on tokio. Waiting is done with
//! `tokio::time::sleep`, `tokio::select!` or channel waits, never by parking
//! a worker thread. Network I/O goes through `reqwest` and
//! `tokio-tungstenite`, never `std::net` or `reqwest::blocking`.
//!
//! **Exceptions**: Test code. Startup file reads (config, pattern PNGs) run
//! before the engine starts and are allowed.

use architectural_enforcement::{report, scan, PRODUCTION_DIRS};

#[test]
fn test_no_thread_sleep_in_production_code() {
    let violations = scan(PRODUCTION_DIRS, |_, code| {
        code.contains("thread::sleep(") || code.contains("std::thread::sleep")
    });
    report("Blocking thread sleep in production code", &violations);
}

#[test]
fn test_no_blocking_network_io_in_production_code() {
    let violations = scan(PRODUCTION_DIRS, |_, code| {
        code.contains("std::net::") || code.contains("reqwest::blocking")
    });
    report("Blocking network I/O in production code", &violations);
}

#[test]
fn test_no_block_on_inside_the_library() {
    let violations = scan(&["painter/core/src"], |_, code| {
        code.contains("block_on(") || code.contains("Runtime::new(")
    });
    report("Nested runtime in the core library", &violations);
}
