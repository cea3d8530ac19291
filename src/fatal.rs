//! Process-ending failure handling.
//!
//! There is no in-process supervisor: anything that cannot be handled is
//! logged and the process exits non-zero so an external supervisor can
//! restart it from the last checkpoint.

use std::panic;
use tracing::error;

/// Exit status used for every fatal termination.
pub const FATAL_EXIT_CODE: i32 = 1;

/// Logs `reason` and terminates the process.
pub fn terminate(reason: &str) -> ! {
    error!("Fatal error, terminating: {}", reason);
    std::process::exit(FATAL_EXIT_CODE)
}

/// Routes panics from any thread or task through `tracing` and exits.
///
/// Tokio keeps running after a spawned task panics; with this hook
/// installed such a panic ends the process instead.
pub fn install_panic_hook() {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        error!(panic = %info, "Unhandled failure, terminating");
        default_hook(info);
        std::process::exit(FATAL_EXIT_CODE);
    }));
}
