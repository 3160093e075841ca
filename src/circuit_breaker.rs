use failsafe::{backoff, failure_policy, Config, StateMachine};
use std::time::Duration;

/// Health tracker for the audit sink.
pub type AuditCircuitBreaker =
    StateMachine<failure_policy::ConsecutiveFailures<backoff::Exponential>, ()>;

/// Creates the circuit breaker that tracks audit sink failures.
///
/// It never gates a write. While OPEN, further write failures are logged at
/// debug level only.
///
/// # Configuration
///
/// - **Failure threshold**: 5 consecutive failures triggers OPEN state.
/// - **Backoff**: Exponential backoff from 10s to 60s before attempting recovery.
///
/// # States
///
/// - **CLOSED**: Failures are logged as warnings.
/// - **OPEN**: Sink known to be failing, warnings are suppressed.
/// - **HALF_OPEN**: The next outcome decides whether warnings resume.
pub fn create_audit_circuit_breaker() -> AuditCircuitBreaker {
    let backoff_strategy = backoff::exponential(
        Duration::from_secs(10), // Initial delay
        Duration::from_secs(60), // Maximum delay
    );

    let failure_policy = failure_policy::consecutive_failures(5, backoff_strategy);

    Config::new().failure_policy(failure_policy).build()
}
