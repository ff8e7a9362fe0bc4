//! The monitor record model: what a monitor probes, how it is configured,
//! and the alert state it carries between evaluation cycles.

pub mod error;
pub mod model;
pub mod target;

pub use error::MonitorError;
pub use model::{Monitor, MonitorConfig, MonitorState, NewMonitor, NotifyType, Reaction};
pub use target::{MonitorTarget, ProbeKind, ProbeSpec};
