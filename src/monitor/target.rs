use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

use super::error::MonitorError;

/// What kind of probe a monitor runs. Persisted in the `type` column by code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i16", into = "i16")]
pub enum ProbeKind {
    Http,
    Port,
    Process,
    Script,
}

impl ProbeKind {
    pub fn code(self) -> i16 {
        match self {
            ProbeKind::Http => 1,
            ProbeKind::Port => 2,
            ProbeKind::Process => 3,
            ProbeKind::Script => 4,
        }
    }

    pub fn from_code(code: i16) -> Result<Self, MonitorError> {
        match code {
            1 => Ok(ProbeKind::Http),
            2 => Ok(ProbeKind::Port),
            3 => Ok(ProbeKind::Process),
            4 => Ok(ProbeKind::Script),
            _ => Err(MonitorError::InvalidConfig(format!(
                "unknown probe kind code: {code}"
            ))),
        }
    }
}

impl TryFrom<i16> for ProbeKind {
    type Error = MonitorError;

    fn try_from(code: i16) -> Result<Self, Self::Error> {
        ProbeKind::from_code(code)
    }
}

impl From<ProbeKind> for i16 {
    fn from(kind: ProbeKind) -> Self {
        kind.code()
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The target descriptor of a monitor.
///
/// Stored as one opaque JSON blob. Which fields matter depends on the
/// monitor's [`ProbeKind`]; the rest are carried along untouched, including
/// keys this version does not know about (kept in `extra`).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MonitorTarget {
    #[serde(default)]
    pub items: Vec<String>,
    /// Seconds allowed for a single probe attempt.
    #[serde(default)]
    pub timeout: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Kind-specific view of a [`MonitorTarget`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeSpec<'a> {
    Http { urls: &'a [String] },
    Port { addresses: &'a [String] },
    Process { names: Vec<&'a str> },
    Script { script: &'a str },
}

impl MonitorTarget {
    pub fn encode(&self) -> Result<Vec<u8>, MonitorError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, MonitorError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Probe timeout, never shorter than one second.
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.max(1))
    }

    pub fn spec(&self, kind: ProbeKind) -> ProbeSpec<'_> {
        match kind {
            ProbeKind::Http => ProbeSpec::Http { urls: &self.items },
            ProbeKind::Port => ProbeSpec::Port {
                addresses: &self.items,
            },
            ProbeKind::Process => {
                let mut names: Vec<&str> = Vec::new();
                if let Some(process) = self.process.as_deref().filter(|p| !p.trim().is_empty()) {
                    names.push(process);
                }
                names.extend(self.items.iter().map(String::as_str));
                ProbeSpec::Process { names }
            }
            ProbeKind::Script => ProbeSpec::Script {
                script: self.script.as_deref().unwrap_or_default(),
            },
        }
    }
}
