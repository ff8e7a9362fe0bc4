//! Evaluation scheduler.
//!
//! Each enabled monitor gets one task that probes its target every
//! `second` seconds and hands the outcome to the [`EvaluationService`].
//! Cycles of one monitor never overlap, across restarts of its task
//! included; different monitors run independently.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::alerting::EvaluationService;
use crate::monitor::{Monitor, MonitorError, MonitorTarget, ProbeKind};
use crate::probe::{ProbeOutcome, Prober};

/// Extra time a probe gets on top of its own timeout before the cycle
/// gives up on it.
const PROBE_GRACE: Duration = Duration::from_secs(1);

/// Wall-clock time derived from the runtime's monotonic clock, so alert
/// spacing follows the same clock as the probe intervals.
#[derive(Debug, Clone, Copy)]
struct Clock {
    wall: DateTime<Utc>,
    mono: Instant,
}

impl Clock {
    fn start() -> Self {
        Self { wall: Utc::now(), mono: Instant::now() }
    }

    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.mono.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.wall + elapsed
    }
}

/// What a running task probes. A reconfigure that leaves it unchanged
/// keeps the task.
#[derive(Debug, Clone, PartialEq)]
struct ProbePlan {
    kind: ProbeKind,
    target: MonitorTarget,
    interval: Duration,
}

impl ProbePlan {
    fn of(monitor: &Monitor) -> Self {
        Self {
            kind: monitor.config.probe_kind,
            target: monitor.config.target.clone(),
            interval: Duration::from_secs(u64::from(monitor.config.second.max(1))),
        }
    }
}

struct Registration {
    generation: u64,
    plan: ProbePlan,
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

type Registrations = Arc<DashMap<i64, Registration>>;
type LastProbes = Arc<DashMap<i64, Instant>>;

pub struct MonitorScheduler {
    evaluator: Arc<EvaluationService>,
    prober: Arc<dyn Prober>,
    registrations: Registrations,
    /// Start of the latest probe per monitor. Outlives registrations so a
    /// restarted task still honours the interval.
    last_probes: LastProbes,
    next_generation: AtomicU64,
    clock: Clock,
}

impl MonitorScheduler {
    pub fn new(evaluator: Arc<EvaluationService>, prober: Arc<dyn Prober>) -> Self {
        Self {
            evaluator,
            prober,
            registrations: Arc::new(DashMap::new()),
            last_probes: Arc::new(DashMap::new()),
            next_generation: AtomicU64::new(1),
            clock: Clock::start(),
        }
    }

    /// Starts evaluating `monitor` from a fresh tracker. A disabled monitor
    /// is not scheduled. An existing registration for the same id is
    /// replaced.
    pub fn register(&self, monitor: &Monitor) {
        if !monitor.state.is_enabled() {
            debug!(monitor_id = monitor.id, "Not scheduling disabled monitor.");
            self.unregister(monitor.id);
            return;
        }
        self.evaluator.seed(monitor, self.clock.now());
        self.start(monitor);
        info!(monitor_id = monitor.id, interval_seconds = monitor.config.second, "Monitor scheduled.");
    }

    /// Stops scheduling monitor `id`. A probe already in flight finishes,
    /// but its outcome is discarded.
    pub fn unregister(&self, id: i64) {
        if let Some((_, registration)) = self.registrations.remove(&id) {
            let _ = registration.shutdown_tx.send(());
            info!(monitor_id = id, "Monitor unscheduled.");
        }
        self.evaluator.forget(id);
    }

    /// Unregisters a deleted monitor and drops everything kept for it.
    pub fn remove(&self, id: i64) {
        self.unregister(id);
        self.last_probes.remove(&id);
    }

    /// Picks up an edited configuration. The failure streak survives. When
    /// kind, target and interval are unchanged the running task is kept;
    /// otherwise the new task waits for the old one and probes no earlier
    /// than one new interval after the last probe.
    pub fn reconfigure(&self, monitor: &Monitor) {
        if !monitor.state.is_enabled() {
            self.unregister(monitor.id);
            return;
        }
        self.evaluator.seed_if_absent(monitor, self.clock.now());
        let unchanged = self
            .registrations
            .get(&monitor.id)
            .is_some_and(|registration| registration.plan == ProbePlan::of(monitor));
        if unchanged {
            debug!(monitor_id = monitor.id, "Probe settings unchanged; keeping task.");
            return;
        }
        self.start(monitor);
        info!(monitor_id = monitor.id, interval_seconds = monitor.config.second, "Monitor rescheduled.");
    }

    pub fn is_registered(&self, id: i64) -> bool {
        self.registrations.contains_key(&id)
    }

    pub fn registered_count(&self) -> usize {
        self.registrations.len()
    }

    /// Stops every monitor task and waits for them to finish.
    pub async fn shutdown(&self) {
        let ids: Vec<i64> = self.registrations.iter().map(|entry| *entry.key()).collect();
        let mut handles = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some((_, registration)) = self.registrations.remove(&id) {
                let _ = registration.shutdown_tx.send(());
                handles.push(registration.handle);
            }
        }
        info!(tasks = handles.len(), "Stopping monitor tasks.");
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                warn!(error = %e, "Monitor task ended abnormally.");
            }
        }
    }

    fn start(&self, monitor: &Monitor) {
        let id = monitor.id;
        let previous = self.registrations.remove(&id).map(|(_, registration)| {
            let _ = registration.shutdown_tx.send(());
            registration.handle
        });

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let plan = ProbePlan::of(monitor);
        let task = MonitorTask {
            id,
            generation,
            plan: plan.clone(),
            prober: self.prober.clone(),
            evaluator: self.evaluator.clone(),
            registrations: self.registrations.clone(),
            last_probes: self.last_probes.clone(),
            clock: self.clock,
        };

        // The entry stays locked until the registration is in place, so the
        // new task cannot look itself up before it exists.
        let entry = self.registrations.entry(id);
        let handle = tokio::spawn(task.run(shutdown_rx, previous));
        let registration = Registration { generation, plan, shutdown_tx, handle };
        let replaced = match entry {
            Entry::Occupied(mut occupied) => Some(occupied.insert(registration)),
            Entry::Vacant(vacant) => {
                vacant.insert(registration);
                None
            }
        };
        if let Some(raced) = replaced {
            let _ = raced.shutdown_tx.send(());
        }
    }
}

struct MonitorTask {
    id: i64,
    generation: u64,
    plan: ProbePlan,
    prober: Arc<dyn Prober>,
    evaluator: Arc<EvaluationService>,
    registrations: Registrations,
    last_probes: LastProbes,
    clock: Clock,
}

impl MonitorTask {
    fn is_current(&self) -> bool {
        self.registrations
            .get(&self.id)
            .is_some_and(|registration| registration.generation == self.generation)
    }

    async fn run(self, mut shutdown_rx: oneshot::Receiver<()>, previous: Option<JoinHandle<()>>) {
        // A replaced task may still be probing; let it finish first.
        if let Some(previous) = previous {
            tokio::select! {
                biased;
                _ = &mut shutdown_rx => return,
                _ = previous => {}
            }
        }

        let first_tick = self
            .last_probes
            .get(&self.id)
            .map(|last| *last + self.plan.interval)
            .unwrap_or_else(Instant::now);
        let mut ticker = interval_at(first_tick, self.plan.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let probe_timeout = self.plan.target.probe_timeout();

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown_rx => {
                    debug!(monitor_id = self.id, "Monitor task received shutdown signal.");
                    break;
                }
                _ = ticker.tick() => {}
            }

            self.last_probes.insert(self.id, Instant::now());
            let outcome = timeout(
                probe_timeout + PROBE_GRACE,
                self.prober.probe(self.plan.kind, &self.plan.target, probe_timeout),
            )
            .await
            .unwrap_or_else(|_| {
                ProbeOutcome::unhealthy(format!(
                    "{} probe timed out after {}s",
                    self.plan.kind,
                    probe_timeout.as_secs()
                ))
            });

            match self
                .evaluator
                .process_outcome(self.id, outcome, self.clock.now(), || self.is_current())
                .await
            {
                Ok(_) => {}
                Err(MonitorError::NotFound(_)) => {
                    warn!(monitor_id = self.id, "Monitor no longer exists; stopping its task.");
                    self.registrations
                        .remove_if(&self.id, |_, registration| registration.generation == self.generation);
                    self.last_probes.remove(&self.id);
                    break;
                }
                Err(e) => {
                    error!(monitor_id = self.id, error = %e, "Failed to apply probe outcome; retrying next cycle.");
                }
            }
        }
    }
}
