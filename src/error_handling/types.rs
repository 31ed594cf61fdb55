use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    BadResolution(String),
    BadDisplay(String),
    BadTarget(String),
    NotInRange(String),
    ManualWithoutDebugger,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::BadResolution(e) => write!(f, "Resolution error: {}", e),
            ConfigError::BadDisplay(e) => write!(f, "Display error: {}", e),
            ConfigError::BadTarget(e) => write!(f, "Target error: {}", e),
            ConfigError::NotInRange(e) => write!(f, "Value out of range: {}", e),
            ConfigError::ManualWithoutDebugger => {
                write!(f, "Manual capture mode requires a debugger target")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

#[derive(Debug)]
pub enum ProcessError {
    SpawnFailed(String),
    ExitedEarly(String),
    StopTimeout(String),
    IoError(std::io::Error),
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessError::SpawnFailed(e) => write!(f, "Process spawn failed: {}", e),
            ProcessError::ExitedEarly(e) => {
                write!(f, "Process exited during startup grace window: {}", e)
            }
            ProcessError::StopTimeout(e) => write!(f, "Graceful stop timed out: {}", e),
            ProcessError::IoError(e) => write!(f, "Process IO error: {}", e),
        }
    }
}

impl std::error::Error for ProcessError {}

impl From<std::io::Error> for ProcessError {
    fn from(err: std::io::Error) -> Self {
        ProcessError::IoError(err)
    }
}

#[derive(Debug)]
pub enum BackendError {
    ConnectionFailed(String),
    ConnectionClosed,
    CaptureFailed(String),
    ProcessError(ProcessError),
    EncodeFailed(String),
    InsufficientFrames(u64),
    ArtifactMissing(PathBuf),
    IoError(std::io::Error),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::ConnectionFailed(e) => write!(f, "Debugger connection failed: {}", e),
            BackendError::ConnectionClosed => write!(f, "Debugger connection closed"),
            BackendError::CaptureFailed(e) => write!(f, "Frame capture failed: {}", e),
            BackendError::ProcessError(e) => write!(f, "Capture process error: {}", e),
            BackendError::EncodeFailed(e) => write!(f, "Video encode failed: {}", e),
            BackendError::InsufficientFrames(n) => {
                write!(f, "Not enough frames captured for a video: {}", n)
            }
            BackendError::ArtifactMissing(p) => {
                write!(f, "Expected recording file missing: {}", p.display())
            }
            BackendError::IoError(e) => write!(f, "Capture IO error: {}", e),
        }
    }
}

impl std::error::Error for BackendError {}

impl From<ProcessError> for BackendError {
    fn from(err: ProcessError) -> Self {
        BackendError::ProcessError(err)
    }
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::IoError(err)
    }
}

#[derive(Debug)]
pub enum SessionError {
    AlreadyActive(String),
    NotActive,
    ConfigError(ConfigError),
    DisplayError(ProcessError),
    BackendStart(BackendError),
    BackendStop(BackendError),
    RecoveryFailed(String),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::AlreadyActive(e) => write!(f, "A session is already active: {}", e),
            SessionError::NotActive => write!(f, "No session is active"),
            SessionError::ConfigError(e) => write!(f, "Session configuration error: {}", e),
            SessionError::DisplayError(e) => write!(f, "Display stage failed: {}", e),
            SessionError::BackendStart(e) => write!(f, "Backend start stage failed: {}", e),
            SessionError::BackendStop(e) => write!(f, "Backend stop stage failed: {}", e),
            SessionError::RecoveryFailed(e) => write!(f, "Crash recovery failed: {}", e),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<ConfigError> for SessionError {
    fn from(err: ConfigError) -> Self {
        SessionError::ConfigError(err)
    }
}

#[derive(Debug)]
pub enum WebError {
    BindError(std::io::Error),
    ServerFailed(String),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::BindError(e) => write!(f, "Web server bind error: {}", e),
            WebError::ServerFailed(e) => write!(f, "Web server failed: {}", e),
        }
    }
}

impl std::error::Error for WebError {}

#[derive(Debug)]
pub enum ControllerError {
    ConfigurationError(ConfigError),
    SessionError(SessionError),
    WebError(WebError),
    WorkloadError(std::io::Error),
    InitializationFailed(String),
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::ConfigurationError(e) => write!(f, "Configuration error: {}", e),
            ControllerError::SessionError(e) => write!(f, "Session error: {}", e),
            ControllerError::WebError(e) => write!(f, "Web error: {}", e),
            ControllerError::WorkloadError(e) => write!(f, "Workload error: {}", e),
            ControllerError::InitializationFailed(e) => write!(f, "Initialization failed: {}", e),
        }
    }
}

impl std::error::Error for ControllerError {}

impl From<ConfigError> for ControllerError {
    fn from(err: ConfigError) -> Self {
        ControllerError::ConfigurationError(err)
    }
}

impl From<SessionError> for ControllerError {
    fn from(err: SessionError) -> Self {
        ControllerError::SessionError(err)
    }
}

impl From<WebError> for ControllerError {
    fn from(err: WebError) -> Self {
        ControllerError::WebError(err)
    }
}
