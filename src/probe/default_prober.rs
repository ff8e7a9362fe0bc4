use async_trait::async_trait;
use futures::future::join_all;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::process::Command as TokioCommand;
use tracing::debug;

use super::{ProbeOutcome, Prober};
use crate::monitor::{MonitorTarget, ProbeKind, ProbeSpec};

const MAX_DIAGNOSTIC_LEN: usize = 2048;

/// Probes targets from the local host: HTTP GET, TCP connect, `pgrep`
/// for processes and a shell for inline scripts. Items of a target are
/// checked concurrently and every one must pass; the first failing item
/// decides the diagnostic.
pub struct DefaultProber {
    client: reqwest::Client,
    shell: String,
}

impl DefaultProber {
    pub fn new(shell: impl Into<String>) -> Result<Self, reqwest::Error> {
        // A redirect answer counts as healthy, so it is not followed.
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client, shell: shell.into() })
    }

    async fn check_http(&self, url: &str, timeout: Duration) -> ProbeOutcome {
        let start_time = Instant::now();
        match self.client.get(url).timeout(timeout).send().await {
            Ok(response) => {
                let status = response.status();
                let elapsed_ms = start_time.elapsed().as_millis();
                if status.is_success() || status.is_redirection() {
                    ProbeOutcome::healthy(format!("{url}: {status} in {elapsed_ms} ms"))
                } else {
                    ProbeOutcome::unhealthy(format!("{url}: {status}"))
                }
            }
            Err(e) if e.is_timeout() => {
                ProbeOutcome::unhealthy(format!("{url}: Error: Request timed out"))
            }
            Err(e) => ProbeOutcome::unhealthy(format!("{url}: Error: {e}")),
        }
    }

    async fn check_port(&self, address: &str, timeout: Duration) -> ProbeOutcome {
        match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
            Ok(Ok(_stream)) => ProbeOutcome::healthy(format!("{address}: Connection successful")),
            Ok(Err(e)) => ProbeOutcome::unhealthy(format!("{address}: Error: {e}")),
            Err(_) => ProbeOutcome::unhealthy(format!("{address}: Error: Connection timed out")),
        }
    }

    async fn check_process(&self, name: &str, timeout: Duration) -> ProbeOutcome {
        let mut command = TokioCommand::new("pgrep");
        command.arg("-f").arg(name);
        match run_command(command, timeout).await {
            Ok((true, _)) => ProbeOutcome::healthy(format!("process {name} is running")),
            Ok((false, _)) => ProbeOutcome::unhealthy(format!("process {name} not found")),
            Err(e) => ProbeOutcome::unhealthy(format!("process {name}: Error: {e}")),
        }
    }

    async fn check_script(&self, script: &str, timeout: Duration) -> ProbeOutcome {
        if script.trim().is_empty() {
            return ProbeOutcome::unhealthy("script is empty");
        }

        let temp_file = match tempfile::Builder::new().suffix(".sh").tempfile() {
            Ok(file) => file,
            Err(e) => {
                return ProbeOutcome::unhealthy(format!(
                    "Failed to create temporary script file: {e}"
                ))
            }
        };
        if let Err(e) = tokio::fs::write(temp_file.path(), script.as_bytes()).await {
            return ProbeOutcome::unhealthy(format!("Failed to write temporary script file: {e}"));
        }
        // Closes the handle so the shell can read the file; deleted on drop.
        let temp_path = temp_file.into_temp_path();

        let mut command = TokioCommand::new(&self.shell);
        command.arg(temp_path.as_os_str());
        match run_command(command, timeout).await {
            Ok((true, output)) => ProbeOutcome::healthy(output),
            Ok((false, output)) => ProbeOutcome::unhealthy(output),
            Err(e) => ProbeOutcome::unhealthy(format!("script: Error: {e}")),
        }
    }
}

/// Runs a command to completion and returns (exit success, combined output).
async fn run_command(
    mut command: TokioCommand,
    timeout: Duration,
) -> Result<(bool, String), String> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command.spawn().map_err(|e| e.to_string())?;
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|e| e.to_string())?,
        Err(_) => return Err(format!("timed out after {}s", timeout.as_secs())),
    };

    let mut text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(stderr.trim());
    }
    if !output.status.success() && text.is_empty() {
        text = format!("exited with {}", output.status);
    }
    Ok((output.status.success(), truncate(text)))
}

fn truncate(mut text: String) -> String {
    if text.len() > MAX_DIAGNOSTIC_LEN {
        let mut cut = MAX_DIAGNOSTIC_LEN;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text
}

#[async_trait]
impl Prober for DefaultProber {
    async fn probe(&self, kind: ProbeKind, target: &MonitorTarget, timeout: Duration) -> ProbeOutcome {
        let mut outcomes = match target.spec(kind) {
            ProbeSpec::Http { urls } => {
                join_all(urls.iter().map(|url| self.check_http(url, timeout))).await
            }
            ProbeSpec::Port { addresses } => {
                join_all(addresses.iter().map(|address| self.check_port(address, timeout))).await
            }
            ProbeSpec::Process { names } => {
                join_all(names.iter().map(|name| self.check_process(name, timeout))).await
            }
            ProbeSpec::Script { script } => vec![self.check_script(script, timeout).await],
        };

        if outcomes.is_empty() {
            return ProbeOutcome::unhealthy(format!("no {kind} items configured"));
        }
        debug!(kind = %kind, checked = outcomes.len(), "Probe finished.");

        match outcomes.iter().position(|o| !o.healthy) {
            Some(index) => outcomes.swap_remove(index),
            None => ProbeOutcome::healthy(
                outcomes
                    .into_iter()
                    .map(|o| o.diagnostic)
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
        }
    }
}
