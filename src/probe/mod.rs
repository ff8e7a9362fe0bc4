//! Probe collaborator: evaluates a monitor's target once.

use async_trait::async_trait;
use std::time::Duration;

use crate::monitor::{MonitorTarget, ProbeKind};

pub mod default_prober;

pub use default_prober::DefaultProber;

/// Result of one probe. Timeouts and unreachable targets are plain
/// unhealthy outcomes, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub healthy: bool,
    pub diagnostic: String,
}

impl ProbeOutcome {
    pub fn healthy(diagnostic: impl Into<String>) -> Self {
        Self { healthy: true, diagnostic: diagnostic.into() }
    }

    pub fn unhealthy(diagnostic: impl Into<String>) -> Self {
        Self { healthy: false, diagnostic: diagnostic.into() }
    }
}

#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, kind: ProbeKind, target: &MonitorTarget, timeout: Duration) -> ProbeOutcome;
}
