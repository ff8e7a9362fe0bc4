use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use crate::monitor::NotifyType;

pub mod webhook;

pub use webhook::WebhookNotifier;

#[derive(Error, Debug)]
pub enum SenderError {
    #[error("Failed to send notification: {0}")]
    SendFailed(String),
    #[error("Invalid configuration for sender: {0}")]
    InvalidConfiguration(String),
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
    #[error("Templating error: {0}")]
    TemplatingError(String),
}

/// Why a monitor is notifying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    /// The failure threshold was just reached.
    Alert,
    /// Still failing after a full silent cycle.
    Reminder,
    /// Left the alerting state.
    Recovery,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::Alert => "alert",
            NotificationKind::Reminder => "reminder",
            NotificationKind::Recovery => "recovery",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationMessage {
    pub kind: NotificationKind,
    pub monitor_id: i64,
    pub monitor_name: String,
    pub detail: String,
    pub time: DateTime<Utc>,
}

impl NotificationMessage {
    pub fn title(&self) -> String {
        match self.kind {
            NotificationKind::Alert => format!("Monitor {} is failing", self.monitor_name),
            NotificationKind::Reminder => format!("Monitor {} is still failing", self.monitor_name),
            NotificationKind::Recovery => format!("Monitor {} has recovered", self.monitor_name),
        }
    }

    /// Plain-text body shared by the IM channels.
    pub fn text(&self) -> String {
        let mut text = format!(
            "{}\nMonitor: {} (#{})\nTime: {}",
            self.title(),
            self.monitor_name,
            self.monitor_id,
            self.time.format("%Y-%m-%d %H:%M:%S UTC"),
        );
        if !self.detail.is_empty() {
            text.push_str("\nDetail: ");
            text.push_str(&self.detail);
        }
        text
    }

    /// Template variables for channels that render a body.
    pub fn context(&self) -> HashMap<String, String> {
        HashMap::from([
            ("kind".to_string(), self.kind.to_string()),
            ("monitor_id".to_string(), self.monitor_id.to_string()),
            ("monitor_name".to_string(), self.monitor_name.clone()),
            ("title".to_string(), self.title()),
            ("detail".to_string(), self.detail.clone()),
            ("time".to_string(), self.time.to_rfc3339()),
        ])
    }
}

/// Delivers a notification to the channel selected by `notify_type`.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        notify_type: NotifyType,
        notify_target: &str,
        message: &NotificationMessage,
    ) -> Result<(), SenderError>;
}
