//! Process-wide fault boundary.
//!
//! A panic anywhere (including inside a handler task, which tokio would
//! otherwise swallow) means internal state can no longer be trusted. The
//! hook logs it and exits with status 1 after a delay, leaving the restart
//! to the process manager.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::error;

/// Delay between a fatal fault and process exit.
pub const RESTART_DELAY: Duration = Duration::from_secs(5);

static EXIT_SCHEDULED: AtomicBool = AtomicBool::new(false);

/// Install a panic hook that schedules a delayed `exit(1)`. The previous hook
/// still runs, so the usual panic message and backtrace are kept.
pub fn install_panic_boundary(delay: Duration) {
    install_hook(delay, exit_after);
}

fn install_hook(delay: Duration, on_fault: fn(Duration)) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        error!(fault = %info, "uncaught fault");
        previous(info);
        on_fault(delay);
    }));
}

/// Exit with status 1 once `delay` has passed. Only the first call schedules
/// anything; later faults ride on the pending exit.
pub fn exit_after(delay: Duration) {
    schedule_once(&EXIT_SCHEDULED, delay, || std::process::exit(1));
}

/// Run `exit` on a fresh thread after `delay`, unless `scheduled` was
/// already set. Returns whether this call did the scheduling.
fn schedule_once(
    scheduled: &AtomicBool,
    delay: Duration,
    exit: impl FnOnce() + Send + 'static,
) -> bool {
    if scheduled.swap(true, Ordering::SeqCst) {
        return false;
    }
    error!(delay_secs = delay.as_secs(), "restarting process after delay");
    std::thread::spawn(move || {
        std::thread::sleep(delay);
        exit();
    });
    true
}
