use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use tokio::process::Command;
use tokio::sync::Mutex;

use crate::configuration::{RecorderConfig, SessionOptions};
use crate::error_handling::types::ControllerError;
use crate::process_management::ProcessHandle;
use crate::session_management::SessionController;
use crate::web_interface::WebServer;

/// Exit code reported when the workload is cut short by a signal.
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Top-level wiring: crash recovery on startup, then either the HTTP control
/// server (`serve`) or a one-shot recorded workload (`run`).
pub struct Controller {
    config: RecorderConfig,
    sessions: Arc<Mutex<SessionController>>,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Controller {
    pub fn new(config: RecorderConfig) -> Result<Self, ControllerError> {
        config.validate()?;
        let sessions = Arc::new(Mutex::new(SessionController::new(config.clone())));
        Ok(Self { config, sessions })
    }

    /// Runs the HTTP control server until a termination signal arrives.
    ///
    /// A signal triggers the same cleanup as an explicit stop: whatever the
    /// active session holds (display, encoder, marker) is released before the
    /// process exits.
    pub async fn serve(&mut self) -> Result<(), ControllerError> {
        self.recover().await?;

        let addr: SocketAddr = format!("{}:{}", self.config.bind_address, self.config.port)
            .parse()
            .map_err(|e| {
                ControllerError::InitializationFailed(format!(
                    "invalid bind address {:?}: {}",
                    self.config.bind_address, e
                ))
            })?;

        let server = WebServer::new(self.sessions.clone());
        let outcome = tokio::select! {
            result = server.start(addr) => result.map_err(ControllerError::from),
            _ = shutdown_signal() => Ok(()),
        };

        self.sessions.lock().await.release_all().await;
        outcome
    }

    /// Records one workload: starts a session, runs `command` with `DISPLAY`
    /// pointed at the session's display, stops the session, and returns the
    /// workload's exit code.
    pub async fn run(
        &mut self,
        options: &SessionOptions,
        with_chromedriver: bool,
        command: &[String],
    ) -> Result<i32, ControllerError> {
        let (program, args) = match command.split_first() {
            Some(split) => split,
            None => {
                return Err(ControllerError::InitializationFailed(
                    "no workload command given".to_string(),
                ))
            }
        };

        self.recover().await?;
        self.sessions.lock().await.start(options).await?;
        let display = self.workload_display(options);

        let mut chromedriver = if with_chromedriver {
            match self.start_chromedriver().await {
                Ok(handle) => Some(handle),
                Err(e) => {
                    self.sessions.lock().await.release_all().await;
                    return Err(e);
                }
            }
        } else {
            None
        };

        info!("Running workload: {} {:?}", program, args);
        let mut cmd = Command::new(program);
        cmd.args(args).env("DISPLAY", &display);
        let exit_code = match cmd.spawn() {
            Ok(mut child) => {
                tokio::select! {
                    status = child.wait() => match status {
                        Ok(status) => status.code().unwrap_or(1),
                        Err(e) => {
                            error!("Failed to wait for workload: {}", e);
                            1
                        }
                    },
                    _ = shutdown_signal() => {
                        warn!("Interrupted, terminating workload");
                        let _ = child.start_kill();
                        let _ = child.wait().await;
                        INTERRUPTED_EXIT_CODE
                    }
                }
            }
            Err(e) => {
                error!("Failed to spawn workload {:?}: {}", program, e);
                if let Some(mut handle) = chromedriver.take() {
                    handle.kill().await;
                }
                self.sessions.lock().await.release_all().await;
                return Err(ControllerError::WorkloadError(e));
            }
        };

        if let Some(mut handle) = chromedriver.take() {
            if let Err(e) = handle
                .stop_graceful(libc::SIGTERM, Duration::from_secs(5))
                .await
            {
                warn!("ChromeDriver did not stop gracefully ({}), killing", e);
                handle.kill().await;
            }
        }

        let artifact = self.sessions.lock().await.stop().await?;
        info!(
            "Workload finished with code {}, recording saved to {}",
            exit_code,
            artifact.display()
        );
        println!("{}", artifact.display());
        Ok(exit_code)
    }

    async fn recover(&self) -> Result<(), ControllerError> {
        self.sessions
            .lock()
            .await
            .recover()
            .await
            .map_err(ControllerError::from)
    }

    async fn start_chromedriver(&self) -> Result<ProcessHandle, ControllerError> {
        let mut cmd = Command::new("chromedriver");
        cmd.arg(format!("--port={}", self.config.chromedriver_port));
        ProcessHandle::spawn(
            "chromedriver",
            cmd,
            Duration::from_secs(self.config.spawn_grace_secs),
        )
        .await
        .map_err(|e| ControllerError::InitializationFailed(format!("chromedriver: {}", e)))
    }

    /// The DISPLAY value the workload should see, mirroring how session
    /// options resolve the display.
    fn workload_display(&self, options: &SessionOptions) -> String {
        if let Some(display) = &options.display {
            return display.clone();
        }
        if let Some(target) = &options.target {
            if target.starts_with(':') {
                return target.clone();
            }
        }
        self.config.display.clone()
    }
}

async fn shutdown_signal() {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT, shutting down...");
        }
        _ = async {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};
                let mut sigterm = signal(SignalKind::terminate()).expect("Failed to setup SIGTERM");
                sigterm.recv().await;
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandboxed_config() -> (RecorderConfig, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = RecorderConfig::default();
        config.work_dir = tmp.path().join("work");
        config.recordings_dir = tmp.path().join("recordings");
        (config, tmp)
    }

    #[test]
    fn new_rejects_an_invalid_configuration() {
        let mut config = RecorderConfig::default();
        config.display = "primary".to_string();
        let err = Controller::new(config).unwrap_err();
        assert!(matches!(err, ControllerError::ConfigurationError(_)));
    }

    #[tokio::test]
    async fn run_without_a_command_fails_before_starting_anything() {
        let (config, _tmp) = sandboxed_config();
        let marker = config.marker_path();
        let mut controller = Controller::new(config).unwrap();

        let err = controller
            .run(&SessionOptions::default(), false, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::InitializationFailed(_)));
        assert!(!marker.exists());
    }

    #[test]
    fn workload_display_follows_the_session_resolution_rules() {
        let (config, _tmp) = sandboxed_config();
        let controller = Controller::new(config).unwrap();

        assert_eq!(
            controller.workload_display(&SessionOptions::default()),
            ":99"
        );
        assert_eq!(
            controller.workload_display(&SessionOptions {
                target: Some(":7".to_string()),
                ..SessionOptions::default()
            }),
            ":7"
        );
        assert_eq!(
            controller.workload_display(&SessionOptions {
                display: Some(":12".to_string()),
                ..SessionOptions::default()
            }),
            ":12"
        );
        // A debugger target leaves the default display in place
        assert_eq!(
            controller.workload_display(&SessionOptions {
                target: Some("ws://127.0.0.1:9222/devtools/page/1".to_string()),
                ..SessionOptions::default()
            }),
            ":99"
        );
    }
}
