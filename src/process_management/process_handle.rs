use log::{debug, error, warn};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::error_handling::types::ProcessError;

/// Owns one externally spawned child process (virtual display, encoder, ...).
///
/// The handle is the only thing allowed to terminate the child. Children never
/// inherit our stdio: stdout goes to the null sink and stderr is drained by a
/// background task, so child buffering can never stall the recorder.
#[derive(Debug)]
pub struct ProcessHandle {
    name: String,
    pid: u32,
    child: tokio::process::Child,
}

impl ProcessHandle {
    /// Spawns `command` and watches it for the startup grace window.
    ///
    /// Fails with [`ProcessError::SpawnFailed`] if the executable cannot be
    /// started at all, and with [`ProcessError::ExitedEarly`] if the process
    /// exits within `grace`. A process that would have become healthy after
    /// the window is still treated as a startup failure.
    pub async fn spawn(
        name: &str,
        command: Command,
        grace: Duration,
    ) -> Result<Self, ProcessError> {
        let mut handle = Self::spawn_unverified(name, command).await?;
        handle.watch_startup(grace).await?;
        Ok(handle)
    }

    /// Spawns `command` without running the startup watch, so the caller can
    /// record the pid (for example in the crash-recovery marker) before
    /// calling [`ProcessHandle::watch_startup`].
    pub async fn spawn_unverified(name: &str, mut command: Command) -> Result<Self, ProcessError> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Spawning {} process: {:?}", name, command.as_std());
        let mut child = command.spawn().map_err(|e| {
            error!("Failed to spawn {}: {}", name, e);
            ProcessError::SpawnFailed(format!("{}: {}", name, e))
        })?;

        let pid = child
            .id()
            .ok_or_else(|| ProcessError::SpawnFailed(format!("{}: no pid after spawn", name)))?;

        // Drain stderr line by line into the debug log
        if let Some(stderr) = child.stderr.take() {
            let mut reader = BufReader::new(stderr).lines();
            let pname = name.to_string();
            tokio::spawn(async move {
                while let Ok(Some(line)) = reader.next_line().await {
                    debug!("[{}][stderr] {}", pname, line);
                }
                debug!("stderr monitoring ended for {}", pname);
            });
        }

        debug!("{} started with pid {}", name, pid);
        Ok(Self {
            name: name.to_string(),
            pid,
            child,
        })
    }

    /// Watches the startup grace window: an exit inside it counts as a spawn
    /// failure, even if a restart would have become healthy later.
    pub async fn watch_startup(&mut self, grace: Duration) -> Result<(), ProcessError> {
        let deadline = tokio::time::Instant::now() + grace;
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    error!(
                        "{} (pid {}) exited during startup: {}",
                        self.name, self.pid, status
                    );
                    return Err(ProcessError::ExitedEarly(format!(
                        "{} exited with {}",
                        self.name, status
                    )));
                }
                Ok(None) => {}
                Err(e) => return Err(ProcessError::IoError(e)),
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Non-blocking liveness probe.
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Sends `signal` and waits up to `timeout` for the process to exit.
    ///
    /// On timeout the process is left running and the caller is expected to
    /// escalate to [`ProcessHandle::kill`].
    pub async fn stop_graceful(&mut self, signal: i32, timeout: Duration) -> Result<(), ProcessError> {
        if !self.is_alive() {
            debug!("{} (pid {}) already exited", self.name, self.pid);
            return Ok(());
        }

        debug!("Sending signal {} to {} (pid {})", signal, self.name, self.pid);
        let rc = unsafe { libc::kill(self.pid as libc::pid_t, signal) };
        if rc != 0 {
            // ESRCH: the process exited between the liveness check and the kill
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ESRCH) {
                let _ = self.child.try_wait();
                return Ok(());
            }
            return Err(ProcessError::IoError(err));
        }

        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!("{} stopped gracefully: {}", self.name, status);
                Ok(())
            }
            Ok(Err(e)) => Err(ProcessError::IoError(e)),
            Err(_) => Err(ProcessError::StopTimeout(format!(
                "{} did not exit within {:?}",
                self.name, timeout
            ))),
        }
    }

    /// Unconditional termination; a no-op if the process already exited.
    pub async fn kill(&mut self) {
        if !self.is_alive() {
            return;
        }
        if let Err(e) = self.child.start_kill() {
            warn!("Failed to kill {} (pid {}): {}", self.name, self.pid, e);
            return;
        }
        let _ = self.child.wait().await;
        debug!("{} (pid {}) killed", self.name, self.pid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[tokio::test]
    async fn spawn_fails_for_missing_executable() {
        let cmd = Command::new("reel-no-such-binary");
        let err = ProcessHandle::spawn("missing", cmd, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::SpawnFailed(_)));
    }

    #[tokio::test]
    async fn unverified_spawn_exposes_the_pid_before_the_startup_watch() {
        // The pid is available right after the spawn, so callers can persist
        // it before running the grace window
        let mut handle = ProcessHandle::spawn_unverified("flaky", sh("exit 3"))
            .await
            .unwrap();
        assert!(handle.pid() > 0);

        let err = handle
            .watch_startup(Duration::from_millis(500))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::ExitedEarly(_)));
    }

    #[tokio::test]
    async fn immediate_exit_counts_as_startup_failure() {
        let err = ProcessHandle::spawn("flaky", sh("exit 3"), Duration::from_millis(500))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::ExitedEarly(_)));
    }

    #[tokio::test]
    async fn graceful_stop_terminates_a_live_process() {
        let mut handle = ProcessHandle::spawn("sleeper", sh("sleep 30"), Duration::from_millis(200))
            .await
            .unwrap();
        assert!(handle.is_alive());

        handle
            .stop_graceful(libc::SIGTERM, Duration::from_secs(2))
            .await
            .unwrap();
        assert!(!handle.is_alive());
    }

    #[tokio::test]
    async fn stop_timeout_is_reported_and_kill_escalates() {
        // Ignore SIGTERM so the graceful window has to expire
        let mut handle = ProcessHandle::spawn(
            "stubborn",
            sh("trap '' TERM; sleep 30"),
            Duration::from_millis(200),
        )
        .await
        .unwrap();

        let err = handle
            .stop_graceful(libc::SIGTERM, Duration::from_millis(300))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::StopTimeout(_)));
        assert!(handle.is_alive());

        handle.kill().await;
        assert!(!handle.is_alive());
    }

    #[tokio::test]
    async fn kill_is_a_noop_when_already_dead() {
        let mut handle = ProcessHandle::spawn("short", sh("sleep 30"), Duration::from_millis(100))
            .await
            .unwrap();
        handle.kill().await;
        // Second kill must not panic or block
        handle.kill().await;
        assert!(!handle.is_alive());
    }

    #[tokio::test]
    async fn stop_graceful_is_ok_when_already_dead() {
        let mut handle = ProcessHandle::spawn("gone", sh("sleep 30"), Duration::from_millis(100))
            .await
            .unwrap();
        handle.kill().await;
        handle
            .stop_graceful(libc::SIGTERM, Duration::from_millis(100))
            .await
            .unwrap();
    }
}
