use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{error, info};

use super::models::{ConfigColumns, MonitorRow};
use super::store::MonitorStore;
use crate::monitor::{Monitor, MonitorError, MonitorState, NewMonitor};

const MONITOR_COLUMNS: &str = r#"id, namespace_id, name, "type", target, "second", times, silent_cycle,
    notify_type, notify_target, success_server_id, success_script, fail_server_id, fail_script,
    description, error_content, state, insert_time, update_time"#;

// Same columns, with error_content blanked out for the scheduler listing.
const SCHEDULE_COLUMNS: &str = r#"id, namespace_id, name, "type", target, "second", times, silent_cycle,
    notify_type, notify_target, success_server_id, success_script, fail_server_id, fail_script,
    description, '' AS error_content, state, insert_time, update_time"#;

/// Monitor store backed by the Postgres `monitor` table.
#[derive(Clone)]
pub struct PgMonitorStore {
    pool: PgPool,
}

impl PgMonitorStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, MonitorError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub async fn initialize_schema(&self) -> Result<(), MonitorError> {
        info!("Running monitor table migrations...");
        let migrations = include_str!("../../migrations/0001_create_monitor.sql");
        sqlx::raw_sql(migrations)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to execute monitor migrations.");
                MonitorError::from(e)
            })?;
        info!("Monitor migrations completed successfully.");
        Ok(())
    }
}

fn expect_one_row(rows_affected: u64, id: i64) -> Result<(), MonitorError> {
    if rows_affected == 0 {
        Err(MonitorError::NotFound(id))
    } else {
        Ok(())
    }
}

#[async_trait]
impl MonitorStore for PgMonitorStore {
    async fn list(&self, namespace_id: i64) -> Result<Vec<Monitor>, MonitorError> {
        let rows = sqlx::query_as::<_, MonitorRow>(&format!(
            "SELECT {MONITOR_COLUMNS} FROM monitor WHERE namespace_id = $1 ORDER BY id DESC"
        ))
        .bind(namespace_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Monitor::try_from).collect()
    }

    async fn get(&self, id: i64) -> Result<Monitor, MonitorError> {
        let row = sqlx::query_as::<_, MonitorRow>(&format!(
            "SELECT {MONITOR_COLUMNS} FROM monitor WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(MonitorError::NotFound(id))?;
        Monitor::try_from(row)
    }

    async fn list_by_state(&self, state: MonitorState) -> Result<Vec<Monitor>, MonitorError> {
        let rows = sqlx::query_as::<_, MonitorRow>(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM monitor WHERE state = $1 ORDER BY id"
        ))
        .bind(state.code())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Monitor::try_from).collect()
    }

    async fn create(&self, monitor: &NewMonitor) -> Result<i64, MonitorError> {
        monitor.validate()?;
        let columns = ConfigColumns::from_config(&monitor.config)?;
        let config = &monitor.config;

        let id: i64 = sqlx::query_scalar(
            r#"INSERT INTO monitor (namespace_id, name, "type", target, "second", times, silent_cycle,
                notify_type, notify_target, success_server_id, success_script, fail_server_id,
                fail_script, description, error_content, state)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, '', $15)
               RETURNING id"#,
        )
        .bind(monitor.namespace_id)
        .bind(&config.name)
        .bind(columns.monitor_type)
        .bind(columns.target)
        .bind(columns.second)
        .bind(columns.times)
        .bind(columns.silent_cycle)
        .bind(columns.notify_type)
        .bind(&config.notify_target)
        .bind(config.success_server_id)
        .bind(&config.success_script)
        .bind(config.fail_server_id)
        .bind(&config.fail_script)
        .bind(&config.description)
        .bind(monitor.state.code())
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn update(&self, monitor: &Monitor) -> Result<(), MonitorError> {
        let columns = ConfigColumns::from_config(&monitor.config)?;
        let config = &monitor.config;

        let result = sqlx::query(
            r#"UPDATE monitor SET name = $1, "type" = $2, target = $3, "second" = $4, times = $5,
                silent_cycle = $6, notify_type = $7, notify_target = $8, success_server_id = $9,
                success_script = $10, fail_server_id = $11, fail_script = $12, description = $13,
                update_time = NOW()
               WHERE id = $14"#,
        )
        .bind(&config.name)
        .bind(columns.monitor_type)
        .bind(columns.target)
        .bind(columns.second)
        .bind(columns.times)
        .bind(columns.silent_cycle)
        .bind(columns.notify_type)
        .bind(&config.notify_target)
        .bind(config.success_server_id)
        .bind(&config.success_script)
        .bind(config.fail_server_id)
        .bind(&config.fail_script)
        .bind(&config.description)
        .bind(monitor.id)
        .execute(&self.pool)
        .await?;
        expect_one_row(result.rows_affected(), monitor.id)
    }

    async fn set_state(&self, id: i64, state: MonitorState) -> Result<(), MonitorError> {
        let result =
            sqlx::query("UPDATE monitor SET state = $1, update_time = NOW() WHERE id = $2")
                .bind(state.code())
                .bind(id)
                .execute(&self.pool)
                .await?;
        expect_one_row(result.rows_affected(), id)
    }

    async fn record_error(&self, id: i64, error_content: &str) -> Result<(), MonitorError> {
        let result = sqlx::query(
            "UPDATE monitor SET error_content = $1, update_time = NOW() WHERE id = $2",
        )
        .bind(error_content)
        .bind(id)
        .execute(&self.pool)
        .await?;
        expect_one_row(result.rows_affected(), id)
    }

    async fn delete(&self, id: i64) -> Result<(), MonitorError> {
        let result = sqlx::query("DELETE FROM monitor WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        expect_one_row(result.rows_affected(), id)
    }
}
