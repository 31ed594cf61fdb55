use log::{debug, info, warn};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::process_handle::ProcessHandle;
use super::readiness::wait_until_ready;
use crate::error_handling::types::ProcessError;

/// A virtual X display (Xvfb) owned by one recording session.
pub struct VirtualDisplay {
    handle: ProcessHandle,
    display: String,
}

impl VirtualDisplay {
    /// Starts Xvfb on `display` and probes it with `xdpyinfo`.
    ///
    /// A failed readiness probe is a warning, not an error: recording is
    /// attempted anyway, matching how flaky `xdpyinfo` can be on loaded
    /// machines.
    pub async fn start(
        display: &str,
        resolution: &str,
        grace: Duration,
    ) -> Result<Self, ProcessError> {
        let mut cmd = Command::new("Xvfb");
        cmd.arg(display)
            .arg("-screen")
            .arg("0")
            .arg(format!("{}x24", resolution))
            .arg("-ac");

        let handle = ProcessHandle::spawn("Xvfb", cmd, grace).await?;

        let probed = display.to_string();
        let ready = wait_until_ready(
            "virtual display",
            Duration::from_secs(10),
            Duration::from_millis(500),
            move || {
                let display = probed.clone();
                async move { probe_display(&display).await }
            },
        )
        .await;
        if ready {
            info!("Virtual display started on {}", display);
        } else {
            warn!(
                "Could not verify display {} is ready, continuing anyway",
                display
            );
        }

        Ok(Self {
            handle,
            display: display.to_string(),
        })
    }

    pub fn display(&self) -> &str {
        &self.display
    }

    pub fn pid(&self) -> u32 {
        self.handle.pid()
    }

    pub fn is_alive(&mut self) -> bool {
        self.handle.is_alive()
    }

    /// Stops the display server, escalating to a kill if it ignores SIGTERM.
    pub async fn stop(&mut self) {
        match self
            .handle
            .stop_graceful(libc::SIGTERM, Duration::from_secs(5))
            .await
        {
            Ok(()) => debug!("Stopped Xvfb on {}", self.display),
            Err(e) => {
                warn!("Xvfb on {} did not stop gracefully ({}), killing", self.display, e);
                self.handle.kill().await;
            }
        }
    }
}

async fn probe_display(display: &str) -> bool {
    Command::new("xdpyinfo")
        .arg("-display")
        .arg(display)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}
