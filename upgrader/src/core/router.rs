//! Conditional edge after Verify: the circuit breaker.
//!
//! Termination holds because `attempt_count` only grows (by one per
//! Troubleshoot) and Troubleshoot is only reachable while it is strictly below
//! `max_attempts`.

use crate::core::state::RunState;

/// Why the run is heading to Finalize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Last verification succeeded.
    BuildGreen,
    /// Last verification failed and the attempt budget is spent.
    AttemptsExhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Troubleshoot,
    Finalize(Disposition),
}

/// Decide the next edge from the last verification and the attempt budget.
///
/// A missing verification is treated as a failure.
pub fn route(state: &RunState) -> Route {
    let green = state
        .last_verification()
        .is_some_and(|verification| verification.is_success());
    if green {
        Route::Finalize(Disposition::BuildGreen)
    } else if state.attempts_remaining() {
        Route::Troubleshoot
    } else {
        Route::Finalize(Disposition::AttemptsExhausted)
    }
}
