// ── Failure-driven backoff gate ──
//
// Operations attempted during a cool-down are skipped outright -- no
// network call, no queuing, no retry. This sheds load while the broker is
// unhealthy; callers simply try again later.

use std::time::Duration;

use tokio::time::Instant;

use crate::config::BackoffPolicy;

/// Minimum spacing between "operation suppressed" warnings.
pub const WARN_INTERVAL: Duration = Duration::from_secs(5);

/// Backoff bookkeeping shared by every subscribe/publish caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackoffState {
    /// Consecutive failures, capped at the policy's `max_failures`.
    pub consecutive_failures: u32,
    /// End of the active cool-down, if any.
    pub next_allowed_at: Option<Instant>,
    /// When the last suppression warning was logged.
    pub last_warn_at: Option<Instant>,
}

/// Result of consulting the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    Allowed,
    Suppressed { remaining: Duration, warn: bool },
}

impl BackoffState {
    /// Decide whether an operation may proceed at `now`.
    ///
    /// An elapsed cool-down is cleared here, so `next_allowed_at` is only
    /// ever `Some` while it lies in the future.
    pub(crate) fn admit(&mut self, now: Instant) -> Admission {
        match self.next_allowed_at {
            Some(until) if self.consecutive_failures > 0 && now < until => {
                let warn = self
                    .last_warn_at
                    .is_none_or(|last| now.duration_since(last) >= WARN_INTERVAL);
                if warn {
                    self.last_warn_at = Some(now);
                }
                Admission::Suppressed {
                    remaining: until - now,
                    warn,
                }
            }
            Some(_) => {
                self.next_allowed_at = None;
                Admission::Allowed
            }
            None => Admission::Allowed,
        }
    }

    pub(crate) fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.next_allowed_at = None;
    }

    /// Count a failure and start the next cool-down. Returns its length.
    pub(crate) fn record_failure(&mut self, now: Instant, policy: &BackoffPolicy) -> Duration {
        self.consecutive_failures = self
            .consecutive_failures
            .saturating_add(1)
            .min(policy.max_failures());
        let delay = policy.delay_for(self.consecutive_failures);
        self.next_allowed_at = Some(now + delay);
        delay
    }

    /// Back to the healthy initial state.
    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy::from_secs_f64(1.0, 8.0, 4).unwrap()
    }

    #[test]
    fn healthy_state_admits() {
        let mut state = BackoffState::default();
        assert_eq!(state.admit(Instant::now()), Admission::Allowed);
    }

    #[test]
    fn failure_opens_cooldown() {
        let now = Instant::now();
        let mut state = BackoffState::default();

        let delay = state.record_failure(now, &policy());
        assert_eq!(delay, Duration::from_secs(1));
        assert_eq!(state.consecutive_failures, 1);
        assert!(matches!(
            state.admit(now + Duration::from_millis(500)),
            Admission::Suppressed { warn: true, .. }
        ));
        assert_eq!(state.admit(now + Duration::from_secs(1)), Admission::Allowed);
        assert_eq!(state.next_allowed_at, None);
    }

    #[test]
    fn failures_cap_at_policy_maximum() {
        let now = Instant::now();
        let mut state = BackoffState::default();
        let delays: Vec<_> = (0..7).map(|_| state.record_failure(now, &policy())).collect();

        assert_eq!(state.consecutive_failures, 4);
        assert_eq!(
            delays,
            [1, 2, 4, 8, 8, 8, 8].map(Duration::from_secs).to_vec()
        );
        assert_eq!(state.next_allowed_at, Some(now + Duration::from_secs(8)));
    }

    #[test]
    fn success_resets_failures() {
        let now = Instant::now();
        let mut state = BackoffState::default();
        state.record_failure(now, &policy());
        state.record_failure(now, &policy());

        state.record_success();
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.next_allowed_at, None);
        assert_eq!(state.admit(now), Admission::Allowed);
    }

    #[test]
    fn suppression_warnings_are_rate_limited() {
        let now = Instant::now();
        let mut state = BackoffState::default();
        let long = BackoffPolicy::from_secs_f64(30.0, 30.0, 1).unwrap();
        state.record_failure(now, &long);

        let warned: Vec<bool> = [0, 1, 4, 5, 6, 10]
            .into_iter()
            .map(|s| match state.admit(now + Duration::from_secs(s)) {
                Admission::Suppressed { warn, .. } => warn,
                Admission::Allowed => panic!("should be suppressed at {s}s"),
            })
            .collect();

        assert_eq!(warned, vec![true, false, false, true, false, true]);
    }
}
