//! Join retry policy.
//!
//! Pure state machine: it decides what to do after a failed join and keeps
//! the attempt budget. Scheduling the retry is the coordinator's job.

use std::time::Duration;

use voxmesh_common::CaptureError;
use voxmesh_config::schema::RetryConfig;

use crate::protocol::{ErrorCode, SESSION_NOT_FOUND_MESSAGE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The room has no session yet; usually a race with its creation.
    SessionNotFound,
    /// The user refused microphone access.
    PermissionDenied,
    Generic,
}

impl FailureKind {
    /// Classify an inbound `error` event.
    pub fn classify(message: &str, code: Option<ErrorCode>) -> Self {
        if code == Some(ErrorCode::SessionNotFound) || message == SESSION_NOT_FOUND_MESSAGE {
            FailureKind::SessionNotFound
        } else {
            FailureKind::Generic
        }
    }
}

impl From<&CaptureError> for FailureKind {
    fn from(err: &CaptureError) -> Self {
        match err {
            CaptureError::PermissionDenied => FailureKind::PermissionDenied,
            CaptureError::Unavailable(_) => FailureKind::Generic,
        }
    }
}

/// What the coordinator should do about a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Stay connected without transmitting.
    ListenOnly,
    /// Retry once after a short fixed delay without using the budget.
    FastRetry { delay: Duration },
    /// Retry after a linear backoff; `attempt` is 1-based.
    Backoff { delay: Duration, attempt: u32 },
    /// Budget exhausted.
    GiveUp,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    pub attempt_count: u32,
    pub last_failure: Option<FailureKind>,
}

#[derive(Debug, Clone)]
pub struct ReconnectionPolicy {
    max_retries: u32,
    base_delay: Duration,
    session_not_found_delay: Duration,
    state: RetryState,
}

impl ReconnectionPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            session_not_found_delay: Duration::from_millis(config.session_not_found_delay_ms),
            state: RetryState::default(),
        }
    }

    pub fn on_failure(&mut self, kind: FailureKind) -> RetryDecision {
        self.state.last_failure = Some(kind);
        match kind {
            FailureKind::PermissionDenied => RetryDecision::ListenOnly,
            FailureKind::SessionNotFound => RetryDecision::FastRetry {
                delay: self.session_not_found_delay,
            },
            FailureKind::Generic if self.state.attempt_count < self.max_retries => {
                self.state.attempt_count += 1;
                RetryDecision::Backoff {
                    delay: self.base_delay * self.state.attempt_count,
                    attempt: self.state.attempt_count,
                }
            }
            FailureKind::Generic => RetryDecision::GiveUp,
        }
    }

    /// A join succeeded; the budget starts over.
    pub fn on_success(&mut self) {
        self.state = RetryState::default();
    }

    pub fn attempt_count(&self) -> u32 {
        self.state.attempt_count
    }

    pub fn state(&self) -> RetryState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ReconnectionPolicy {
        ReconnectionPolicy::new(&RetryConfig::default())
    }

    #[test]
    fn generic_failures_back_off_linearly_then_give_up() {
        let mut p = policy();
        let delays: Vec<_> = (0..3)
            .map(|_| match p.on_failure(FailureKind::Generic) {
                RetryDecision::Backoff { delay, .. } => delay,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(
            delays,
            [
                Duration::from_millis(1000),
                Duration::from_millis(2000),
                Duration::from_millis(3000)
            ]
        );
        assert_eq!(p.attempt_count(), 3);
        assert_eq!(p.on_failure(FailureKind::Generic), RetryDecision::GiveUp);
        assert_eq!(p.attempt_count(), 3);
    }

    #[test]
    fn session_not_found_leaves_budget_alone() {
        let mut p = policy();
        p.on_failure(FailureKind::Generic);
        assert_eq!(
            p.on_failure(FailureKind::SessionNotFound),
            RetryDecision::FastRetry {
                delay: Duration::from_millis(300)
            }
        );
        assert_eq!(p.attempt_count(), 1);
        assert_eq!(p.state().last_failure, Some(FailureKind::SessionNotFound));
    }

    #[test]
    fn permission_denied_means_listen_only() {
        let mut p = policy();
        assert_eq!(
            p.on_failure(FailureKind::PermissionDenied),
            RetryDecision::ListenOnly
        );
        assert_eq!(p.attempt_count(), 0);
    }

    #[test]
    fn success_resets_budget() {
        let mut p = policy();
        p.on_failure(FailureKind::Generic);
        p.on_failure(FailureKind::Generic);
        p.on_success();
        assert_eq!(p.state(), RetryState::default());
        assert!(matches!(
            p.on_failure(FailureKind::Generic),
            RetryDecision::Backoff { attempt: 1, .. }
        ));
    }

    #[test]
    fn zero_budget_gives_up_immediately() {
        let mut p = ReconnectionPolicy::new(&RetryConfig {
            max_retries: 0,
            ..RetryConfig::default()
        });
        assert_eq!(p.on_failure(FailureKind::Generic), RetryDecision::GiveUp);
    }

    #[test]
    fn classifies_error_events() {
        assert_eq!(
            FailureKind::classify("whatever", Some(ErrorCode::SessionNotFound)),
            FailureKind::SessionNotFound
        );
        assert_eq!(
            FailureKind::classify(SESSION_NOT_FOUND_MESSAGE, None),
            FailureKind::SessionNotFound
        );
        assert_eq!(
            FailureKind::classify("Room is full", Some(ErrorCode::Unknown)),
            FailureKind::Generic
        );
        assert_eq!(
            FailureKind::from(&CaptureError::PermissionDenied),
            FailureKind::PermissionDenied
        );
        assert_eq!(
            FailureKind::from(&CaptureError::Unavailable("busy".into())),
            FailureKind::Generic
        );
    }
}
