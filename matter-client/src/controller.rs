//! Matter controller subprocess supervisor
//!
//! The bridge owns the lifetime of the controller it talks to: spawn it at
//! startup, detect early exits, and terminate it on shutdown so no orphan
//! survives the parent.

use std::process::Stdio;

use tokio::process::{Child, Command};

use crate::error::Result;

/// Configuration for launching the controller subprocess.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Program to execute. Defaults to the Python reference controller.
    pub program: String,
    /// Arguments before the generated `--storage-path`/`--port` flags.
    pub base_args: Vec<String>,
    /// Directory for the controller's own persistent state.
    pub storage_path: String,
    /// WebSocket port the controller should listen on.
    pub port: u16,
}

impl ControllerConfig {
    pub fn new(storage_path: impl Into<String>, port: u16) -> Self {
        Self {
            program: "python3".to_string(),
            base_args: vec!["-m".to_string(), "matter_server.server".to_string()],
            storage_path: storage_path.into(),
            port,
        }
    }
}

/// A running controller subprocess.
pub struct ControllerProcess {
    child: Child,
}

impl ControllerProcess {
    /// Spawn the controller. The process comes up asynchronously; callers
    /// should connect with bounded retry rather than waiting here.
    pub fn spawn(config: &ControllerConfig) -> Result<Self> {
        let mut cmd = Command::new(&config.program);
        cmd.args(&config.base_args)
            .arg("--storage-path")
            .arg(&config.storage_path)
            .arg("--port")
            .arg(config.port.to_string())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let child = cmd.spawn()?;
        tracing::info!(
            "spawned controller pid {:?} on port {}",
            child.id(),
            config.port
        );
        Ok(Self { child })
    }

    /// Terminate the subprocess and wait for it to exit.
    pub async fn terminate(mut self) {
        tracing::info!("terminating controller subprocess");
        if let Err(e) = self.child.start_kill() {
            tracing::warn!("failed to signal controller: {e}");
            return;
        }
        match self.child.wait().await {
            Ok(status) => tracing::info!("controller exited: {status}"),
            Err(e) => tracing::warn!("failed to reap controller: {e}"),
        }
    }
}
