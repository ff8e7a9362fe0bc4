use async_trait::async_trait;

use crate::monitor::{Monitor, MonitorError, MonitorState, NewMonitor};

/// CRUD and narrow state writes over monitor records.
///
/// Every write is atomic for a single record. Writes that reference a
/// missing id fail with [`MonitorError::NotFound`], `delete` included.
#[async_trait]
pub trait MonitorStore: Send + Sync {
    /// All monitors of a namespace, newest id first.
    async fn list(&self, namespace_id: i64) -> Result<Vec<Monitor>, MonitorError>;

    async fn get(&self, id: i64) -> Result<Monitor, MonitorError>;

    /// Monitors in `state` across all namespaces. `error_content` is left
    /// empty, the scheduler has no use for it.
    async fn list_by_state(&self, state: MonitorState) -> Result<Vec<Monitor>, MonitorError>;

    async fn create(&self, monitor: &NewMonitor) -> Result<i64, MonitorError>;

    /// Replaces every config field of `monitor.id`. State and error content
    /// are not touched.
    async fn update(&self, monitor: &Monitor) -> Result<(), MonitorError>;

    /// The only write path for `state`.
    async fn set_state(&self, id: i64, state: MonitorState) -> Result<(), MonitorError>;

    /// Overwrites the latest diagnostic.
    async fn record_error(&self, id: i64, error_content: &str) -> Result<(), MonitorError>;

    async fn delete(&self, id: i64) -> Result<(), MonitorError>;
}
