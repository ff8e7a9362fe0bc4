use std::sync::Arc;
use tracing::info;

use crate::db::{MonitorStore, RecordLocks};
use crate::monitor::{Monitor, MonitorConfig, MonitorError, MonitorState, NewMonitor};
use crate::scheduler::MonitorScheduler;

/// Operator-facing monitor operations. Every write goes through the store
/// and then brings the scheduler in line with what was persisted.
pub struct MonitorService {
    store: Arc<dyn MonitorStore>,
    scheduler: Arc<MonitorScheduler>,
    locks: Arc<RecordLocks>,
}

impl MonitorService {
    pub fn new(
        store: Arc<dyn MonitorStore>,
        scheduler: Arc<MonitorScheduler>,
        locks: Arc<RecordLocks>,
    ) -> Self {
        Self { store, scheduler, locks }
    }

    /// Schedules every enabled monitor. Returns how many were registered.
    pub async fn bootstrap(&self) -> Result<usize, MonitorError> {
        let mut registered = 0;
        for state in [MonitorState::Healthy, MonitorState::Alerting] {
            for monitor in self.store.list_by_state(state).await? {
                self.scheduler.register(&monitor);
                registered += 1;
            }
        }
        info!(registered, "Monitors loaded from store.");
        Ok(registered)
    }

    pub async fn list(&self, namespace_id: i64) -> Result<Vec<Monitor>, MonitorError> {
        self.store.list(namespace_id).await
    }

    pub async fn get(&self, id: i64) -> Result<Monitor, MonitorError> {
        self.store.get(id).await
    }

    pub async fn add(&self, new_monitor: &NewMonitor) -> Result<Monitor, MonitorError> {
        new_monitor.validate()?;
        let id = self.store.create(new_monitor).await?;
        let monitor = self.store.get(id).await?;
        if monitor.state.is_enabled() {
            self.scheduler.register(&monitor);
        }
        info!(monitor_id = id, namespace_id = monitor.namespace_id, "Monitor created.");
        Ok(monitor)
    }

    /// Replaces the configuration of monitor `id`. State and error content
    /// are kept.
    pub async fn edit(&self, id: i64, config: MonitorConfig) -> Result<Monitor, MonitorError> {
        config.validate()?;
        let _guard = self.locks.lock(id).await;
        let mut monitor = self.store.get(id).await?;
        monitor.config = config;
        self.store.update(&monitor).await?;

        let monitor = self.store.get(id).await?;
        self.scheduler.reconfigure(&monitor);
        info!(monitor_id = id, "Monitor updated.");
        Ok(monitor)
    }

    /// Enables (as `Healthy`) or disables monitor `id`. Enabling a monitor
    /// that is already enabled leaves it untouched.
    pub async fn toggle(&self, id: i64, enabled: bool) -> Result<Monitor, MonitorError> {
        let _guard = self.locks.lock(id).await;
        let mut monitor = self.store.get(id).await?;
        if monitor.state.is_enabled() == enabled {
            return Ok(monitor);
        }

        let state = if enabled { MonitorState::Healthy } else { MonitorState::Disabled };
        self.store.set_state(id, state).await?;
        monitor.state = state;
        if enabled {
            self.scheduler.register(&monitor);
        } else {
            self.scheduler.unregister(id);
        }
        info!(monitor_id = id, state = %state, "Monitor toggled.");
        Ok(monitor)
    }

    pub async fn delete(&self, id: i64) -> Result<(), MonitorError> {
        let guard = self.locks.lock(id).await;
        self.store.delete(id).await?;
        self.scheduler.remove(id);
        drop(guard);
        self.locks.release(id);
        info!(monitor_id = id, "Monitor deleted.");
        Ok(())
    }
}
