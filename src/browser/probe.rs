//! Liveness and version probes against the DevTools HTTP endpoint
//!
//! Diagnostics run each probe on a background thread and wait for it with a fixed timeout.
//! A probe that loses the race is abandoned, not cancelled: its thread keeps running until
//! the underlying call returns on its own, and its result is discarded.

use crate::{browser::config::ConnectionOptions,
            error::{BrowserError, Result}};
use serde::Deserialize;
use std::{path::{Path, PathBuf},
          process::Command,
          sync::mpsc,
          thread,
          time::Duration};

/// Timeout for checking whether something answers on the debugging port
pub const PORT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Timeout for asking an executable for its version
pub const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Response of `GET /json/version`
#[derive(Debug, Clone, Deserialize)]
pub struct VersionInfo {
    #[serde(rename = "Browser", default)]
    pub browser: String,

    #[serde(rename = "User-Agent", default)]
    pub user_agent: String,

    #[serde(rename = "webSocketDebuggerUrl")]
    pub web_socket_debugger_url: String,
}

/// Result of probing a debugging port
#[derive(Debug, Clone)]
pub enum PortStatus {
    Running(VersionInfo),
    NotRunning,
}

impl PortStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, PortStatus::Running(_))
    }
}

/// Run `task` on a background thread and return its result if it finishes within `timeout`
pub fn first_to_finish<T, F>(timeout: Duration, task: F) -> Option<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        // The receiver is gone if we lost the race
        let _ = tx.send(task());
    });
    rx.recv_timeout(timeout).ok()
}

/// Query `/json/version` on the configured port
pub fn fetch_version(options: &ConnectionOptions) -> Result<VersionInfo> {
    let client = reqwest::blocking::Client::builder()
        .timeout(options.timeout_duration())
        .build()
        .map_err(|e| BrowserError::ConnectionFailed(format!("Failed to build HTTP client: {}", e)))?;

    let url = format!("{}/json/version", options.endpoint());
    client
        .get(&url)
        .send()
        .and_then(|response| response.error_for_status())
        .map_err(|e| BrowserError::ConnectionFailed(format!("{} did not answer: {}", url, e)))?
        .json::<VersionInfo>()
        .map_err(|e| BrowserError::ConnectionFailed(format!("Unexpected response from {}: {}", url, e)))
}

/// Check whether a browser answers on `port`, giving up after [`PORT_PROBE_TIMEOUT`]
pub fn probe_port(port: u16) -> PortStatus {
    let options = ConnectionOptions::new(port);
    match first_to_finish(PORT_PROBE_TIMEOUT, move || fetch_version(&options)) {
        Some(Ok(info)) => PortStatus::Running(info),
        Some(Err(e)) => {
            log::debug!("Port {} probe failed: {}", port, e);
            PortStatus::NotRunning
        }
        None => {
            log::debug!("Port {} probe timed out after {:?}", port, PORT_PROBE_TIMEOUT);
            PortStatus::NotRunning
        }
    }
}

/// Ask a browser executable for its version string, giving up after [`VERSION_PROBE_TIMEOUT`]
pub fn executable_version(path: &Path) -> Option<String> {
    let path: PathBuf = path.to_path_buf();
    let output = first_to_finish(VERSION_PROBE_TIMEOUT, move || Command::new(path).arg("--version").output())?;

    match output {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if version.is_empty() { None } else { Some(version) }
        }
        Ok(_) => None,
        Err(e) => {
            log::debug!("Failed to run browser for version: {}", e);
            None
        }
    }
}
