use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::models::{ConfigColumns, MonitorRow};
use super::store::MonitorStore;
use crate::monitor::{Monitor, MonitorError, MonitorState, NewMonitor};

/// Process-local store. Rows keep the target as an encoded blob, the same
/// way the table does, so decode failures surface identically.
#[derive(Default)]
pub struct InMemoryMonitorStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    rows: BTreeMap<i64, MonitorRow>,
}

impl InMemoryMonitorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MonitorStore for InMemoryMonitorStore {
    async fn list(&self, namespace_id: i64) -> Result<Vec<Monitor>, MonitorError> {
        let inner = self.inner.read().await;
        inner
            .rows
            .values()
            .rev()
            .filter(|row| row.namespace_id == namespace_id)
            .map(|row| Monitor::try_from(row.clone()))
            .collect()
    }

    async fn get(&self, id: i64) -> Result<Monitor, MonitorError> {
        let inner = self.inner.read().await;
        let row = inner.rows.get(&id).ok_or(MonitorError::NotFound(id))?;
        Monitor::try_from(row.clone())
    }

    async fn list_by_state(&self, state: MonitorState) -> Result<Vec<Monitor>, MonitorError> {
        let inner = self.inner.read().await;
        inner
            .rows
            .values()
            .filter(|row| row.state == state.code())
            .map(|row| {
                let mut row = row.clone();
                row.error_content.clear();
                Monitor::try_from(row)
            })
            .collect()
    }

    async fn create(&self, monitor: &NewMonitor) -> Result<i64, MonitorError> {
        monitor.validate()?;
        let columns = ConfigColumns::from_config(&monitor.config)?;
        let config = &monitor.config;
        let now = Utc::now();

        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let id = inner.next_id;
        inner.rows.insert(
            id,
            MonitorRow {
                id,
                namespace_id: monitor.namespace_id,
                name: config.name.clone(),
                monitor_type: columns.monitor_type,
                target: columns.target,
                second: columns.second,
                times: columns.times,
                silent_cycle: columns.silent_cycle,
                notify_type: columns.notify_type,
                notify_target: config.notify_target.clone(),
                success_server_id: config.success_server_id,
                success_script: config.success_script.clone(),
                fail_server_id: config.fail_server_id,
                fail_script: config.fail_script.clone(),
                description: config.description.clone(),
                error_content: String::new(),
                state: monitor.state.code(),
                insert_time: now,
                update_time: now,
            },
        );
        Ok(id)
    }

    async fn update(&self, monitor: &Monitor) -> Result<(), MonitorError> {
        let columns = ConfigColumns::from_config(&monitor.config)?;
        let config = &monitor.config;

        let mut inner = self.inner.write().await;
        let row = inner
            .rows
            .get_mut(&monitor.id)
            .ok_or(MonitorError::NotFound(monitor.id))?;
        row.name = config.name.clone();
        row.monitor_type = columns.monitor_type;
        row.target = columns.target;
        row.second = columns.second;
        row.times = columns.times;
        row.silent_cycle = columns.silent_cycle;
        row.notify_type = columns.notify_type;
        row.notify_target = config.notify_target.clone();
        row.success_server_id = config.success_server_id;
        row.success_script = config.success_script.clone();
        row.fail_server_id = config.fail_server_id;
        row.fail_script = config.fail_script.clone();
        row.description = config.description.clone();
        row.update_time = Utc::now();
        Ok(())
    }

    async fn set_state(&self, id: i64, state: MonitorState) -> Result<(), MonitorError> {
        let mut inner = self.inner.write().await;
        let row = inner.rows.get_mut(&id).ok_or(MonitorError::NotFound(id))?;
        row.state = state.code();
        row.update_time = Utc::now();
        Ok(())
    }

    async fn record_error(&self, id: i64, error_content: &str) -> Result<(), MonitorError> {
        let mut inner = self.inner.write().await;
        let row = inner.rows.get_mut(&id).ok_or(MonitorError::NotFound(id))?;
        row.error_content = error_content.to_string();
        row.update_time = Utc::now();
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<(), MonitorError> {
        let mut inner = self.inner.write().await;
        inner
            .rows
            .remove(&id)
            .map(|_| ())
            .ok_or(MonitorError::NotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{new_monitor, sample_config};

    #[tokio::test]
    async fn test_list_is_scoped_and_newest_first() {
        let store = InMemoryMonitorStore::new();
        let first = store.create(&new_monitor(1, MonitorState::Healthy)).await.unwrap();
        let _other = store.create(&new_monitor(2, MonitorState::Healthy)).await.unwrap();
        let third = store.create(&new_monitor(1, MonitorState::Disabled)).await.unwrap();

        let ids: Vec<i64> = store.list(1).await.unwrap().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![third, first]);
    }

    #[tokio::test]
    async fn test_delete_then_get_is_not_found() {
        let store = InMemoryMonitorStore::new();
        let id = store.create(&new_monitor(1, MonitorState::Healthy)).await.unwrap();
        store.delete(id).await.unwrap();

        assert!(matches!(store.get(id).await, Err(MonitorError::NotFound(missing)) if missing == id));
        assert!(matches!(store.delete(id).await, Err(MonitorError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_update_replaces_config_but_not_state() {
        let store = InMemoryMonitorStore::new();
        let id = store.create(&new_monitor(1, MonitorState::Healthy)).await.unwrap();
        store.set_state(id, MonitorState::Alerting).await.unwrap();
        store.record_error(id, "timeout").await.unwrap();

        let mut monitor = store.get(id).await.unwrap();
        monitor.config.name = "renamed".to_string();
        monitor.config.times = 5;
        monitor.state = MonitorState::Disabled;
        store.update(&monitor).await.unwrap();

        let stored = store.get(id).await.unwrap();
        assert_eq!(stored.config.name, "renamed");
        assert_eq!(stored.config.times, 5);
        assert_eq!(stored.state, MonitorState::Alerting);
        assert_eq!(stored.error_content, "timeout");
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let store = InMemoryMonitorStore::new();
        let id = store.create(&new_monitor(1, MonitorState::Healthy)).await.unwrap();
        let mut monitor = store.get(id).await.unwrap();
        monitor.id = 999;
        assert!(matches!(store.update(&monitor).await, Err(MonitorError::NotFound(999))));
        assert!(matches!(
            store.set_state(999, MonitorState::Disabled).await,
            Err(MonitorError::NotFound(999))
        ));
    }

    #[tokio::test]
    async fn test_record_error_overwrites() {
        let store = InMemoryMonitorStore::new();
        let id = store.create(&new_monitor(1, MonitorState::Healthy)).await.unwrap();
        store.record_error(id, "first").await.unwrap();
        store.record_error(id, "second").await.unwrap();
        assert_eq!(store.get(id).await.unwrap().error_content, "second");
    }

    #[tokio::test]
    async fn test_list_by_state_crosses_namespaces_without_error_content() {
        let store = InMemoryMonitorStore::new();
        let a = store.create(&new_monitor(1, MonitorState::Healthy)).await.unwrap();
        let b = store.create(&new_monitor(2, MonitorState::Healthy)).await.unwrap();
        store.create(&new_monitor(2, MonitorState::Disabled)).await.unwrap();
        store.record_error(b, "refused").await.unwrap();

        let healthy = store.list_by_state(MonitorState::Healthy).await.unwrap();
        let ids: Vec<i64> = healthy.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![a, b]);
        assert!(healthy.iter().all(|m| m.error_content.is_empty()));
        assert!(healthy[1].config.fail_reaction().is_some());
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_config() {
        let store = InMemoryMonitorStore::new();
        let mut config = sample_config();
        config.times = 0;
        let monitor = NewMonitor { namespace_id: 1, config, state: MonitorState::Healthy };
        assert!(matches!(store.create(&monitor).await, Err(MonitorError::InvalidConfig(_))));
    }
}
