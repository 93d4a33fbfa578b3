//! Endpoint status transitions.
//!
//! Failures only move an endpoint to `DOWN` once [`FAILURE_THRESHOLD`]
//! consecutive probes have failed; until then the previous status holds. Any
//! success clears the streak and classifies the endpoint as `UP` or, when the
//! response took more than [`DEGRADED_LATENCY_RATIO`] of the timeout,
//! `DEGRADED`.

use super::types::EndpointStatus;

pub const FAILURE_THRESHOLD: u32 = 3;
pub const DEGRADED_LATENCY_RATIO: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Success { latency_ms: u64 },
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub previous: EndpointStatus,
    pub next: EndpointStatus,
    pub consecutive_failures: u32,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.previous != self.next
    }
}

pub fn transition(
    previous: EndpointStatus,
    consecutive_failures: u32,
    outcome: ProbeOutcome,
    timeout_ms: u64,
) -> Transition {
    match outcome {
        ProbeOutcome::Failure => {
            let consecutive_failures = consecutive_failures.saturating_add(1);
            let next = if consecutive_failures >= FAILURE_THRESHOLD {
                EndpointStatus::Down
            } else {
                previous
            };
            Transition { previous, next, consecutive_failures }
        }
        ProbeOutcome::Success { latency_ms } => {
            let next = if is_slow(latency_ms, timeout_ms) {
                EndpointStatus::Degraded
            } else {
                EndpointStatus::Up
            };
            Transition { previous, next, consecutive_failures: 0 }
        }
    }
}

fn is_slow(latency_ms: u64, timeout_ms: u64) -> bool {
    latency_ms as f64 > timeout_ms as f64 * DEGRADED_LATENCY_RATIO
}

#[cfg(test)]
mod tests {
    use super::*;
    use EndpointStatus::*;

    const TIMEOUT: u64 = 5_000;

    fn fail(status: EndpointStatus, failures: u32) -> Transition {
        transition(status, failures, ProbeOutcome::Failure, TIMEOUT)
    }

    fn ok(status: EndpointStatus, failures: u32, latency_ms: u64) -> Transition {
        transition(status, failures, ProbeOutcome::Success { latency_ms }, TIMEOUT)
    }

    #[test]
    fn test_fast_success_is_up() {
        let t = ok(Unknown, 0, 100);
        assert_eq!(t.next, Up);
        assert_eq!(t.consecutive_failures, 0);
        assert!(t.changed());
    }

    #[test]
    fn test_success_resets_any_streak() {
        for failures in [0, 1, 2, 3, 17, u32::MAX] {
            assert_eq!(ok(Down, failures, 10).consecutive_failures, 0);
        }
    }

    #[test]
    fn test_degraded_threshold_is_strictly_above_eighty_percent() {
        assert_eq!(ok(Up, 0, 4_000).next, Up);
        assert_eq!(ok(Up, 0, 4_001).next, Degraded);
        assert_eq!(ok(Degraded, 0, 100).next, Up);
    }

    #[test]
    fn test_sub_threshold_failures_keep_status() {
        for previous in [Up, Degraded, Unknown] {
            let first = fail(previous, 0);
            assert_eq!(first.next, previous);
            assert_eq!(first.consecutive_failures, 1);
            assert!(!first.changed());

            let second = fail(previous, 1);
            assert_eq!(second.next, previous);
            assert!(!second.changed());
        }
    }

    #[test]
    fn test_third_failure_goes_down() {
        let t = fail(Up, 2);
        assert_eq!(t.next, Down);
        assert_eq!(t.consecutive_failures, 3);
        assert!(t.changed());

        let still_down = fail(Down, 3);
        assert_eq!(still_down.next, Down);
        assert_eq!(still_down.consecutive_failures, 4);
        assert!(!still_down.changed());
    }

    #[test]
    fn test_success_mid_streak_restarts_count() {
        let mut status = Up;
        let mut failures = 0;
        for outcome in [
            ProbeOutcome::Failure,
            ProbeOutcome::Failure,
            ProbeOutcome::Success { latency_ms: 50 },
            ProbeOutcome::Failure,
            ProbeOutcome::Failure,
        ] {
            let t = transition(status, failures, outcome, TIMEOUT);
            status = t.next;
            failures = t.consecutive_failures;
        }
        assert_eq!(status, Up);
        assert_eq!(failures, 2);
    }

    #[test]
    fn test_no_transition_returns_to_unknown() {
        for previous in [Up, Down, Degraded] {
            assert_ne!(fail(previous, 0).next, Unknown);
            assert_ne!(ok(previous, 0, 1).next, Unknown);
        }
    }
}
