use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::state_machine::{evaluate, AlertPolicy, AlertTracker, ReactionKind};
use crate::db::{MonitorStore, RecordLocks};
use crate::monitor::{Monitor, MonitorError, MonitorState, NotifyType};
use crate::notifications::{NotificationKind, NotificationMessage, Notifier};
use crate::probe::ProbeOutcome;
use crate::reactions::{ScriptRunError, ScriptRunner};

/// What one applied probe outcome led to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// False when the outcome was dropped because the monitor was
    /// unregistered or disabled while the probe ran.
    pub applied: bool,
    pub transition: Option<MonitorState>,
    /// Notification handed to the notifier, if any.
    pub notification: Option<NotificationKind>,
    /// Script reaction handed to the runner, if any.
    pub reaction: Option<ReactionKind>,
    /// Failures of the side effects above. They never undo the state change.
    pub reaction_errors: Vec<String>,
}

/// Applies probe outcomes to monitor records and fires the resulting
/// notifications and reaction scripts.
pub struct EvaluationService {
    store: Arc<dyn MonitorStore>,
    notifier: Arc<dyn Notifier>,
    script_runner: Arc<dyn ScriptRunner>,
    locks: Arc<RecordLocks>,
    trackers: DashMap<i64, AlertTracker>,
    reaction_timeout: Duration,
    notify_timeout: Duration,
}

impl EvaluationService {
    pub fn new(
        store: Arc<dyn MonitorStore>,
        notifier: Arc<dyn Notifier>,
        script_runner: Arc<dyn ScriptRunner>,
        locks: Arc<RecordLocks>,
        reaction_timeout: Duration,
        notify_timeout: Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            script_runner,
            locks,
            trackers: DashMap::new(),
            reaction_timeout,
            notify_timeout,
        }
    }

    /// Resets the tracker of a freshly registered monitor.
    pub fn seed(&self, monitor: &Monitor, now: DateTime<Utc>) {
        self.trackers
            .insert(monitor.id, AlertTracker::for_monitor(monitor, now));
    }

    /// Seeds only when no tracker exists, so a reconfigured monitor keeps
    /// its failure streak.
    pub fn seed_if_absent(&self, monitor: &Monitor, now: DateTime<Utc>) {
        self.trackers
            .entry(monitor.id)
            .or_insert_with(|| AlertTracker::for_monitor(monitor, now));
    }

    pub fn forget(&self, id: i64) {
        self.trackers.remove(&id);
    }

    pub fn tracker(&self, id: i64) -> Option<AlertTracker> {
        self.trackers.get(&id).map(|tracker| tracker.clone())
    }

    /// Applies one probe outcome to monitor `id`.
    ///
    /// Runs under the monitor's record lock. `still_registered` is checked
    /// once the lock is held; if it reports false, or the stored record is
    /// disabled, the outcome is discarded. Store errors abort the cycle
    /// before the tracker or any side effect is touched, so the next cycle
    /// starts from the same point.
    pub async fn process_outcome<F>(
        &self,
        id: i64,
        outcome: ProbeOutcome,
        now: DateTime<Utc>,
        still_registered: F,
    ) -> Result<CycleReport, MonitorError>
    where
        F: Fn() -> bool + Send,
    {
        let guard = self.locks.lock(id).await;

        if !still_registered() {
            debug!(monitor_id = id, "Monitor unregistered while probing; discarding outcome.");
            // A delete may already have released this id; don't leave the
            // entry this call created behind.
            drop(guard);
            self.locks.release(id);
            return Ok(CycleReport::default());
        }

        let monitor = self.store.get(id).await?;
        if monitor.state == MonitorState::Disabled {
            debug!(monitor_id = id, "Monitor disabled while probing; discarding outcome.");
            return Ok(CycleReport::default());
        }

        let tracker = self
            .tracker(id)
            .unwrap_or_else(|| AlertTracker::for_monitor(&monitor, now));
        let decision = evaluate(
            monitor.state,
            &tracker,
            AlertPolicy::of(&monitor),
            &outcome,
            now,
        );

        if let Some(error_content) = &decision.error_content {
            self.store.record_error(id, error_content).await?;
        }
        if let Some(next) = decision.transition {
            self.store.set_state(id, next).await?;
            info!(
                monitor_id = id,
                monitor_name = %monitor.config.name,
                from = %monitor.state,
                to = %next,
                diagnostic = %outcome.diagnostic,
                "Monitor changed state."
            );
        } else {
            debug!(
                monitor_id = id,
                healthy = outcome.healthy,
                consecutive_failures = decision.tracker.consecutive_failures,
                "Probe outcome applied."
            );
        }
        self.trackers.insert(id, decision.tracker.clone());
        drop(guard);

        let mut report = CycleReport {
            applied: true,
            transition: decision.transition,
            ..Default::default()
        };

        let notification = decision
            .notification
            .filter(|_| {
                monitor.config.notify_type != NotifyType::None
                    && !monitor.config.notify_target.trim().is_empty()
            })
            .map(|kind| NotificationMessage {
                kind,
                monitor_id: id,
                monitor_name: monitor.config.name.clone(),
                detail: outcome.diagnostic.clone(),
                time: now,
            });
        let reaction = decision.reaction.and_then(|kind| {
            let script = match kind {
                ReactionKind::Success => monitor.config.success_reaction(),
                ReactionKind::Fail => monitor.config.fail_reaction(),
            };
            script.map(|script| (kind, script))
        });
        report.notification = notification.as_ref().map(|message| message.kind);
        report.reaction = reaction.map(|(kind, _)| kind);

        let notify_future = async {
            let message = notification.as_ref()?;
            let sent = timeout(
                self.notify_timeout,
                self.notifier.notify(
                    monitor.config.notify_type,
                    &monitor.config.notify_target,
                    message,
                ),
            )
            .await;
            match sent {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(format!("notification failed: {e}")),
                Err(_) => Some(format!(
                    "notification timed out after {}s",
                    self.notify_timeout.as_secs()
                )),
            }
        };
        let script_future = async {
            let (kind, script) = reaction?;
            let ran = timeout(
                self.reaction_timeout,
                self.script_runner.run(script.server_id, script.script),
            )
            .await
            .unwrap_or(Err(ScriptRunError::Timeout(self.reaction_timeout.as_secs())));
            match ran {
                Ok(output) if output.ok => None,
                Ok(output) => Some(format!("{kind:?} script reported failure: {}", output.output)),
                Err(e) => Some(format!("{kind:?} script failed: {e}")),
            }
        };

        let (notify_error, script_error) = futures::join!(notify_future, script_future);
        for error in notify_error.into_iter().chain(script_error) {
            warn!(monitor_id = id, error = %error, "Monitor reaction failed.");
            report.reaction_errors.push(error);
        }

        Ok(report)
    }
}
