//! Pure alert-state transitions.
//!
//! Given the persisted state, the per-monitor [`AlertTracker`] and one probe
//! outcome, [`evaluate`] decides what has to be written and fired. It does
//! no I/O; the evaluation service persists the decision and runs the
//! side effects.

use chrono::{DateTime, Duration, Utc};

use crate::monitor::{Monitor, MonitorState};
use crate::notifications::NotificationKind;
use crate::probe::ProbeOutcome;

/// Process-local alert bookkeeping for one monitor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertTracker {
    pub consecutive_failures: u32,
    pub last_alert_at: Option<DateTime<Utc>>,
}

impl AlertTracker {
    /// Tracker for a monitor that is (re)registered at `now`. A monitor that
    /// is already alerting starts saturated, with its last alert treated as
    /// having fired at `now`.
    pub fn for_monitor(monitor: &Monitor, now: DateTime<Utc>) -> Self {
        match monitor.state {
            MonitorState::Alerting => Self {
                consecutive_failures: u32::from(monitor.config.times),
                last_alert_at: Some(now),
            },
            _ => Self::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertPolicy {
    pub times: u16,
    pub silent_cycle: u32,
}

impl AlertPolicy {
    pub fn of(monitor: &Monitor) -> Self {
        Self {
            times: monitor.config.times,
            silent_cycle: monitor.config.silent_cycle,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionKind {
    Success,
    Fail,
}

/// Everything one evaluation cycle has to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// State to persist through `set_state`, when it changes.
    pub transition: Option<MonitorState>,
    /// Diagnostic to persist through `record_error`.
    pub error_content: Option<String>,
    pub notification: Option<NotificationKind>,
    pub reaction: Option<ReactionKind>,
    /// Tracker to keep once the writes succeed.
    pub tracker: AlertTracker,
}

impl Decision {
    fn unchanged(tracker: &AlertTracker) -> Self {
        Self {
            transition: None,
            error_content: None,
            notification: None,
            reaction: None,
            tracker: tracker.clone(),
        }
    }
}

pub fn evaluate(
    state: MonitorState,
    tracker: &AlertTracker,
    policy: AlertPolicy,
    outcome: &ProbeOutcome,
    now: DateTime<Utc>,
) -> Decision {
    match (state, outcome.healthy) {
        (MonitorState::Disabled, _) => Decision::unchanged(tracker),

        (MonitorState::Healthy, true) => Decision {
            tracker: AlertTracker {
                consecutive_failures: 0,
                ..tracker.clone()
            },
            ..Decision::unchanged(tracker)
        },

        (MonitorState::Alerting, true) => Decision {
            transition: Some(MonitorState::Healthy),
            // Recovery clears the diagnostic.
            error_content: Some(String::new()),
            notification: Some(NotificationKind::Recovery),
            reaction: Some(ReactionKind::Success),
            tracker: AlertTracker::default(),
        },

        (MonitorState::Healthy, false) => {
            let failures = tracker.consecutive_failures.saturating_add(1);
            if failures >= u32::from(policy.times) {
                Decision {
                    transition: Some(MonitorState::Alerting),
                    error_content: Some(outcome.diagnostic.clone()),
                    notification: Some(NotificationKind::Alert),
                    reaction: Some(ReactionKind::Fail),
                    tracker: AlertTracker {
                        consecutive_failures: failures,
                        last_alert_at: Some(now),
                    },
                }
            } else {
                Decision {
                    error_content: Some(outcome.diagnostic.clone()),
                    tracker: AlertTracker {
                        consecutive_failures: failures,
                        ..tracker.clone()
                    },
                    ..Decision::unchanged(tracker)
                }
            }
        }

        (MonitorState::Alerting, false) => {
            let failures = tracker.consecutive_failures.saturating_add(1);
            let silent_cycle = Duration::seconds(i64::from(policy.silent_cycle));
            let remind = tracker
                .last_alert_at
                .map_or(true, |last| now - last >= silent_cycle);
            Decision {
                transition: None,
                error_content: Some(outcome.diagnostic.clone()),
                notification: remind.then_some(NotificationKind::Reminder),
                reaction: None,
                tracker: AlertTracker {
                    consecutive_failures: failures,
                    last_alert_at: if remind { Some(now) } else { tracker.last_alert_at },
                },
            }
        }
    }
}
