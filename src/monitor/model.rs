use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::MonitorError;
use super::target::{MonitorTarget, ProbeKind};

/// Alert state of a monitor. Persisted in the `state` column by code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i16", into = "i16")]
pub enum MonitorState {
    Disabled,
    Healthy,
    Alerting,
}

impl MonitorState {
    pub fn code(self) -> i16 {
        match self {
            MonitorState::Disabled => 0,
            MonitorState::Healthy => 1,
            MonitorState::Alerting => 2,
        }
    }

    pub fn from_code(code: i16) -> Result<Self, MonitorError> {
        match code {
            0 => Ok(MonitorState::Disabled),
            1 => Ok(MonitorState::Healthy),
            2 => Ok(MonitorState::Alerting),
            _ => Err(MonitorError::InvalidConfig(format!(
                "unknown monitor state code: {code}"
            ))),
        }
    }

    pub fn is_enabled(self) -> bool {
        self != MonitorState::Disabled
    }
}

impl TryFrom<i16> for MonitorState {
    type Error = MonitorError;

    fn try_from(code: i16) -> Result<Self, Self::Error> {
        MonitorState::from_code(code)
    }
}

impl From<MonitorState> for i16 {
    fn from(state: MonitorState) -> Self {
        state.code()
    }
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Channel a monitor notifies through. `notify_target` holds the destination
/// (the robot or webhook URL) for every channel except `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i16", into = "i16")]
pub enum NotifyType {
    #[default]
    None,
    WeCom,
    DingTalk,
    FeiShu,
    Webhook,
}

impl NotifyType {
    pub fn code(self) -> i16 {
        match self {
            NotifyType::None => 0,
            NotifyType::WeCom => 1,
            NotifyType::DingTalk => 2,
            NotifyType::FeiShu => 3,
            NotifyType::Webhook => 255,
        }
    }

    pub fn from_code(code: i16) -> Result<Self, MonitorError> {
        match code {
            0 => Ok(NotifyType::None),
            1 => Ok(NotifyType::WeCom),
            2 => Ok(NotifyType::DingTalk),
            3 => Ok(NotifyType::FeiShu),
            255 => Ok(NotifyType::Webhook),
            _ => Err(MonitorError::InvalidConfig(format!(
                "unknown notify type code: {code}"
            ))),
        }
    }
}

impl TryFrom<i16> for NotifyType {
    type Error = MonitorError;

    fn try_from(code: i16) -> Result<Self, Self::Error> {
        NotifyType::from_code(code)
    }
}

impl From<NotifyType> for i16 {
    fn from(notify_type: NotifyType) -> Self {
        notify_type.code()
    }
}

/// A script to run on a managed server. The server is a weak reference,
/// resolved by whoever executes the script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reaction<'a> {
    pub server_id: i64,
    pub script: &'a str,
}

/// Operator-set configuration of a monitor. Replaced as a whole on edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub probe_kind: ProbeKind,
    pub target: MonitorTarget,
    /// Probe interval in seconds.
    pub second: u32,
    /// Consecutive failures before the alert fires.
    pub times: u16,
    /// Minimum seconds between repeated alerts while still failing.
    pub silent_cycle: u32,
    #[serde(default)]
    pub notify_type: NotifyType,
    #[serde(default)]
    pub notify_target: String,
    #[serde(default)]
    pub success_server_id: i64,
    #[serde(default)]
    pub success_script: String,
    #[serde(default)]
    pub fail_server_id: i64,
    #[serde(default)]
    pub fail_script: String,
    #[serde(default)]
    pub description: String,
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.name.trim().is_empty() {
            return Err(MonitorError::InvalidConfig("name must not be empty".to_string()));
        }
        if self.second == 0 {
            return Err(MonitorError::InvalidConfig("second must be greater than 0".to_string()));
        }
        if self.times == 0 {
            return Err(MonitorError::InvalidConfig("times must be at least 1".to_string()));
        }
        if i32::try_from(self.second).is_err() || i32::try_from(self.silent_cycle).is_err() {
            return Err(MonitorError::InvalidConfig(
                "second and silentCycle must fit in a 32-bit signed integer".to_string(),
            ));
        }
        Ok(())
    }

    pub fn success_reaction(&self) -> Option<Reaction<'_>> {
        reaction(self.success_server_id, &self.success_script)
    }

    pub fn fail_reaction(&self) -> Option<Reaction<'_>> {
        reaction(self.fail_server_id, &self.fail_script)
    }
}

fn reaction(server_id: i64, script: &str) -> Option<Reaction<'_>> {
    if server_id > 0 && !script.trim().is_empty() {
        Some(Reaction { server_id, script })
    } else {
        None
    }
}

/// A persisted monitor: identity, configuration and mutable alert state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Monitor {
    pub id: i64,
    pub namespace_id: i64,
    #[serde(flatten)]
    pub config: MonitorConfig,
    pub error_content: String,
    pub state: MonitorState,
    pub insert_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

/// Input of the add operation. Only `Healthy` or `Disabled` are accepted as
/// the initial state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMonitor {
    pub namespace_id: i64,
    #[serde(flatten)]
    pub config: MonitorConfig,
    pub state: MonitorState,
}

impl NewMonitor {
    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.state == MonitorState::Alerting {
            return Err(MonitorError::InvalidConfig(
                "a new monitor starts either Healthy or Disabled".to_string(),
            ));
        }
        self.config.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_config;

    #[test]
    fn test_validate_rejects_bad_thresholds() {
        let mut config = sample_config();
        config.times = 0;
        assert!(matches!(config.validate(), Err(MonitorError::InvalidConfig(_))));

        let mut config = sample_config();
        config.second = 0;
        assert!(matches!(config.validate(), Err(MonitorError::InvalidConfig(_))));

        assert!(sample_config().validate().is_ok());
    }

    #[test]
    fn test_new_monitor_cannot_start_alerting() {
        let new_monitor = NewMonitor {
            namespace_id: 1,
            config: sample_config(),
            state: MonitorState::Alerting,
        };
        assert!(new_monitor.validate().is_err());
    }

    #[test]
    fn test_reactions_require_server_and_script() {
        let mut config = sample_config();
        config.fail_server_id = 7;
        config.fail_script = "systemctl restart nginx".to_string();
        config.success_server_id = 0;
        config.success_script = "echo ok".to_string();

        assert_eq!(
            config.fail_reaction(),
            Some(Reaction { server_id: 7, script: "systemctl restart nginx" })
        );
        assert_eq!(config.success_reaction(), None);

        config.fail_script = "   ".to_string();
        assert_eq!(config.fail_reaction(), None);
    }

    #[test]
    fn test_state_codes() {
        assert_eq!(MonitorState::from_code(2).unwrap(), MonitorState::Alerting);
        assert!(MonitorState::from_code(3).is_err());
        assert!(!MonitorState::Disabled.is_enabled());
        assert!(MonitorState::Alerting.is_enabled());
        assert_eq!(NotifyType::from_code(255).unwrap(), NotifyType::Webhook);
    }
}
