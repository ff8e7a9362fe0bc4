//! Shared fixtures and collaborator doubles for unit tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

use crate::db::{InMemoryMonitorStore, MonitorStore};
use crate::monitor::{
    Monitor, MonitorConfig, MonitorError, MonitorState, MonitorTarget, NewMonitor, NotifyType,
    ProbeKind,
};
use crate::notifications::{NotificationKind, NotificationMessage, Notifier, SenderError};
use crate::probe::{ProbeOutcome, Prober};
use crate::reactions::{ScriptOutput, ScriptRunError, ScriptRunner};

pub fn sample_config() -> MonitorConfig {
    MonitorConfig {
        name: "payments-db".to_string(),
        probe_kind: ProbeKind::Port,
        target: MonitorTarget {
            items: vec!["10.0.0.5:5432".to_string()],
            timeout: 3,
            ..Default::default()
        },
        second: 10,
        times: 3,
        silent_cycle: 60,
        notify_type: NotifyType::Webhook,
        notify_target: "https://hooks.example.com/monitor".to_string(),
        success_server_id: 7,
        success_script: "echo recovered >> /var/log/failover.log".to_string(),
        fail_server_id: 7,
        fail_script: "systemctl restart pgbouncer".to_string(),
        description: "primary payments database".to_string(),
    }
}

pub fn new_monitor(namespace_id: i64, state: MonitorState) -> NewMonitor {
    NewMonitor { namespace_id, config: sample_config(), state }
}

pub fn new_monitor_with(times: u16, silent_cycle: u32) -> NewMonitor {
    let mut monitor = new_monitor(1, MonitorState::Healthy);
    monitor.config.times = times;
    monitor.config.silent_cycle = silent_cycle;
    monitor
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(NotifyType, String, NotificationMessage)>>,
    pub fail: bool,
    pub delay: Option<Duration>,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self { fail: true, ..Default::default() }
    }

    /// Takes `delay` to deliver each message.
    pub fn slow(delay: Duration) -> Self {
        Self { delay: Some(delay), ..Default::default() }
    }

    pub fn kinds(&self) -> Vec<NotificationKind> {
        self.sent.lock().unwrap().iter().map(|(_, _, m)| m.kind).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        notify_type: NotifyType,
        notify_target: &str,
        message: &NotificationMessage,
    ) -> Result<(), SenderError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.sent
            .lock()
            .unwrap()
            .push((notify_type, notify_target.to_string(), message.clone()));
        if self.fail {
            Err(SenderError::SendFailed("robot rejected message".to_string()))
        } else {
            Ok(())
        }
    }
}

#[derive(Default)]
pub struct RecordingRunner {
    pub runs: Mutex<Vec<(i64, String)>>,
    pub fail: bool,
}

impl RecordingRunner {
    pub fn failing() -> Self {
        Self { fail: true, ..Default::default() }
    }

    pub fn scripts(&self) -> Vec<String> {
        self.runs.lock().unwrap().iter().map(|(_, s)| s.clone()).collect()
    }
}

#[async_trait]
impl ScriptRunner for RecordingRunner {
    async fn run(&self, server_id: i64, script: &str) -> Result<ScriptOutput, ScriptRunError> {
        self.runs.lock().unwrap().push((server_id, script.to_string()));
        if self.fail {
            Err(ScriptRunError::Unavailable(server_id))
        } else {
            Ok(ScriptOutput { ok: true, output: String::new() })
        }
    }
}

/// Returns queued outcomes in order, then `fallback` forever.
pub struct ScriptedProber {
    outcomes: Mutex<VecDeque<ProbeOutcome>>,
    fallback: ProbeOutcome,
    pub calls: AtomicUsize,
}

impl ScriptedProber {
    pub fn always(outcome: ProbeOutcome) -> Self {
        Self::new(Vec::new(), outcome)
    }

    pub fn new(outcomes: Vec<ProbeOutcome>, fallback: ProbeOutcome) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            fallback,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, _kind: ProbeKind, _target: &MonitorTarget, _timeout: Duration) -> ProbeOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

/// Announces every probe on `started` and blocks until `release` is
/// notified, then fails.
pub struct GatedProber {
    started: mpsc::UnboundedSender<()>,
    pub release: Arc<Notify>,
}

impl GatedProber {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<()>, Arc<Notify>) {
        let (started, started_rx) = mpsc::unbounded_channel();
        let release = Arc::new(Notify::new());
        (Self { started, release: release.clone() }, started_rx, release)
    }
}

#[async_trait]
impl Prober for GatedProber {
    async fn probe(&self, _kind: ProbeKind, _target: &MonitorTarget, _timeout: Duration) -> ProbeOutcome {
        let _ = self.started.send(());
        self.release.notified().await;
        ProbeOutcome::unhealthy("connection refused")
    }
}

/// Wraps the in-memory store and fails the first `record_error_failures`
/// calls to `record_error`.
pub struct FlakyStore {
    pub inner: InMemoryMonitorStore,
    record_error_failures: AtomicUsize,
}

impl FlakyStore {
    pub fn new(record_error_failures: usize) -> Self {
        Self {
            inner: InMemoryMonitorStore::new(),
            record_error_failures: AtomicUsize::new(record_error_failures),
        }
    }
}

#[async_trait]
impl MonitorStore for FlakyStore {
    async fn list(&self, namespace_id: i64) -> Result<Vec<Monitor>, MonitorError> {
        self.inner.list(namespace_id).await
    }

    async fn get(&self, id: i64) -> Result<Monitor, MonitorError> {
        self.inner.get(id).await
    }

    async fn list_by_state(&self, state: MonitorState) -> Result<Vec<Monitor>, MonitorError> {
        self.inner.list_by_state(state).await
    }

    async fn create(&self, monitor: &NewMonitor) -> Result<i64, MonitorError> {
        self.inner.create(monitor).await
    }

    async fn update(&self, monitor: &Monitor) -> Result<(), MonitorError> {
        self.inner.update(monitor).await
    }

    async fn set_state(&self, id: i64, state: MonitorState) -> Result<(), MonitorError> {
        self.inner.set_state(id, state).await
    }

    async fn record_error(&self, id: i64, error_content: &str) -> Result<(), MonitorError> {
        let remaining = self.record_error_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.record_error_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(MonitorError::Store("connection reset by peer".to_string()));
        }
        self.inner.record_error(id, error_content).await
    }

    async fn delete(&self, id: i64) -> Result<(), MonitorError> {
        self.inner.delete(id).await
    }
}
