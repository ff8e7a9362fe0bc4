use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::monitor::{
    Monitor, MonitorConfig, MonitorError, MonitorState, MonitorTarget, NotifyType, ProbeKind,
};

/// Represents a monitor as stored in the `monitor` table.
/// The target descriptor is kept as an opaque JSON blob.
#[derive(Debug, Clone, FromRow)]
pub struct MonitorRow {
    pub id: i64,
    pub namespace_id: i64,
    pub name: String,
    #[sqlx(rename = "type")]
    pub monitor_type: i16,
    pub target: Vec<u8>,
    pub second: i32,
    pub times: i32,
    pub silent_cycle: i32,
    pub notify_type: i16,
    pub notify_target: String,
    pub success_server_id: i64,
    pub success_script: String,
    pub fail_server_id: i64,
    pub fail_script: String,
    pub description: String,
    pub error_content: String,
    pub state: i16,
    pub insert_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

impl TryFrom<MonitorRow> for Monitor {
    type Error = MonitorError;

    fn try_from(row: MonitorRow) -> Result<Self, Self::Error> {
        let config = MonitorConfig {
            name: row.name,
            probe_kind: ProbeKind::from_code(row.monitor_type)?,
            target: MonitorTarget::decode(&row.target)?,
            second: column_to_unsigned(row.second, "second")?,
            times: u16::try_from(row.times).map_err(|_| {
                MonitorError::InvalidConfig(format!("times out of range: {}", row.times))
            })?,
            silent_cycle: column_to_unsigned(row.silent_cycle, "silent_cycle")?,
            notify_type: NotifyType::from_code(row.notify_type)?,
            notify_target: row.notify_target,
            success_server_id: row.success_server_id,
            success_script: row.success_script,
            fail_server_id: row.fail_server_id,
            fail_script: row.fail_script,
            description: row.description,
        };

        Ok(Monitor {
            id: row.id,
            namespace_id: row.namespace_id,
            config,
            error_content: row.error_content,
            state: MonitorState::from_code(row.state)?,
            insert_time: row.insert_time,
            update_time: row.update_time,
        })
    }
}

fn column_to_unsigned(value: i32, column: &str) -> Result<u32, MonitorError> {
    u32::try_from(value)
        .map_err(|_| MonitorError::InvalidConfig(format!("{column} out of range: {value}")))
}

/// Column values of a config as they are bound into SQL.
pub(crate) struct ConfigColumns {
    pub monitor_type: i16,
    pub target: Vec<u8>,
    pub second: i32,
    pub times: i32,
    pub silent_cycle: i32,
    pub notify_type: i16,
}

impl ConfigColumns {
    pub fn from_config(config: &MonitorConfig) -> Result<Self, MonitorError> {
        config.validate()?;
        Ok(Self {
            monitor_type: config.probe_kind.code(),
            target: config.target.encode()?,
            // Ranges are checked by `validate`.
            second: config.second as i32,
            times: i32::from(config.times),
            silent_cycle: config.silent_cycle as i32,
            notify_type: config.notify_type.code(),
        })
    }
}
