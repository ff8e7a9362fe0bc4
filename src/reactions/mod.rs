//! Remote script runner collaborator, used for the success and fail
//! reactions of a monitor.

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum ScriptRunError {
    #[error("No remote script runner is configured (server {0})")]
    Unavailable(i64),
    #[error("Reaction timed out after {0}s")]
    Timeout(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOutput {
    pub ok: bool,
    pub output: String,
}

/// Runs a script on a managed server, identified by id.
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    async fn run(&self, server_id: i64, script: &str) -> Result<ScriptOutput, ScriptRunError>;
}

/// Runner for deployments without a remote execution channel. Every call
/// fails, so configured reactions show up in the logs instead of silently
/// doing nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredScriptRunner;

#[async_trait]
impl ScriptRunner for UnconfiguredScriptRunner {
    async fn run(&self, server_id: i64, _script: &str) -> Result<ScriptOutput, ScriptRunError> {
        warn!(server_id, "Reaction script requested but no remote runner is configured.");
        Err(ScriptRunError::Unavailable(server_id))
    }
}
