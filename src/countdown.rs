//! Interruptible waits with an inline console countdown.

use std::time::{Duration, Instant};

use crate::logging::Console;
use crate::state::SharedState;

/// Sleep in short chunks so a shutdown request is honored promptly.
/// Returns false if shutdown interrupted the wait.
pub fn interruptible_sleep(state: &SharedState, duration: Duration) -> bool {
    let deadline = Instant::now() + duration;
    while state.is_running() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return true;
        }
        std::thread::sleep(remaining.min(Duration::from_millis(200)));
    }
    false
}

/// Wait `total_seconds`, repainting a single console line every
/// `refresh_seconds` with the remaining time. Returns false when the wait
/// was cut short by shutdown.
pub fn run_countdown(
    state: &SharedState,
    console: &Console,
    total_seconds: f64,
    refresh_seconds: f64,
    label: &str,
) -> bool {
    if total_seconds <= 0.0 {
        return state.is_running();
    }
    let refresh = Duration::from_secs_f64(refresh_seconds.max(0.1));
    let deadline = Instant::now() + Duration::from_secs_f64(total_seconds);

    while state.is_running() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            console.clear_inline();
            return true;
        }
        console.write_inline(&format!("{}: {}s", label, remaining.as_secs() + 1));
        if !interruptible_sleep(state, remaining.min(refresh)) {
            break;
        }
    }
    console.clear_inline();
    false
}
