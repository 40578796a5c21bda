//! Integration Test: Errors Are Propagated
//!
//! **Policy**: Production code returns `PainterResult`/`ConfigError` (core) or
//! `anyhow::Result` (daemon) and uses `?`. `unwrap()` and `expect()` are for
//! tests only. Fallbacks such as `unwrap_or` and `unwrap_or_else` are fine.
//!
//! The core library reports through `tracing`; printing to stdout is left to
//! the daemon's subscriber.

use architectural_enforcement::{report, scan, PRODUCTION_DIRS};

#[test]
fn test_no_unwrap_in_production_code() {
    let violations = scan(PRODUCTION_DIRS, |_, code| {
        code.contains(".unwrap()") || code.contains(".expect(")
    });
    report("unwrap/expect in production code", &violations);
}

#[test]
fn test_no_stdout_printing_in_core() {
    let violations = scan(&["painter/core/src"], |_, code| {
        code.contains("println!") || code.contains("print!(") || code.contains("dbg!(")
    });
    report("stdout printing in the core library", &violations);
}

#[test]
fn test_no_panicking_macros_in_core() {
    let violations = scan(&["painter/core/src"], |_, code| {
        code.contains("panic!(") || code.contains("todo!(") || code.contains("unimplemented!(")
    });
    report("panicking macros in the core library", &violations);
}
