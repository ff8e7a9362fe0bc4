//! Persistence boundary for monitor records.
//!
//! [`MonitorStore`] is the single source of truth for a monitor's `state` and
//! `error_content`. Two implementations are provided: a Postgres store backed
//! by `sqlx`, and an in-memory store used by tests and by deployments that
//! run without a database.

pub mod memory_store;
pub mod models;
pub mod pg_store;
pub mod record_locks;
pub mod store;

pub use memory_store::InMemoryMonitorStore;
pub use pg_store::PgMonitorStore;
pub use record_locks::RecordLocks;
pub use store::MonitorStore;
