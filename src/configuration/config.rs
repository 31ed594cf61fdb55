use chrono::Local;
use log::{debug, info};
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::types::{BackendKind, CaptureTarget, SessionConfig, SessionOptions};
use crate::error_handling::types::ConfigError;

/// Recorder configuration holding the defaults every session resolves against.
///
/// Loaded from a TOML file with [`RecorderConfig::from_file`]; every field is
/// optional in the file and falls back to the built-in default. Command-line
/// flags override individual fields after loading.
///
/// # Fields Overview
///
/// - `bind_address` / `port`: where the HTTP control server listens
/// - `recordings_dir`: directory for auto-named recordings
/// - `work_dir`: scratch directory owning the frame sequence and the
///   crash-recovery marker
/// - `display`: X display spawned for sessions without a target (`:99`)
/// - `resolution` / `fps`: capture defaults (`1920x1080`, 15)
/// - `chromedriver_port`: ChromeDriver port for the `run` subcommand
/// - `spawn_grace_secs`: startup window in which a child exit counts as a
///   spawn failure
/// - `stop_timeout_secs`: graceful-stop window for the streaming encoder
/// - `drain_timeout_secs`: wait for an in-flight sampler capture on stop
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    pub bind_address: String,
    pub port: u16,
    pub recordings_dir: PathBuf,
    pub work_dir: PathBuf,
    pub display: String,
    pub resolution: String,
    pub fps: u32,
    pub chromedriver_port: u16,
    pub spawn_grace_secs: u64,
    pub stop_timeout_secs: u64,
    pub drain_timeout_secs: u64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            bind_address: String::from("127.0.0.1"),
            port: 9876,
            recordings_dir: PathBuf::from("recordings"),
            work_dir: std::env::temp_dir().join("reel"),
            display: String::from(":99"),
            resolution: String::from("1920x1080"),
            fps: 15,
            chromedriver_port: 9515,
            spawn_grace_secs: 2,
            stop_timeout_secs: 10,
            drain_timeout_secs: 1,
        }
    }
}

impl RecorderConfig {
    /// Loads and validates a configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        info!("Loading configuration from {}", path.display());
        let contents = std::fs::read_to_string(path).map_err(ConfigError::IoError)?;
        let config: RecorderConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::TomlError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the shape of the configured defaults.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_fps(self.fps)?;
        validate_resolution(&self.resolution)?;
        validate_display(&self.display)?;
        Ok(())
    }

    /// Path of the crash-recovery marker file.
    pub fn marker_path(&self) -> PathBuf {
        self.work_dir.join("reel-session.json")
    }

    /// Working directory for the sampler's numbered frame sequence.
    pub fn frame_dir(&self) -> PathBuf {
        self.work_dir.join("frames")
    }

    /// Resolves per-session options against the defaults into a
    /// [`SessionConfig`]. This happens once, at session creation.
    pub fn resolve(&self, options: &SessionOptions) -> Result<SessionConfig, ConfigError> {
        let fps = options.fps.unwrap_or(self.fps);
        validate_fps(fps)?;

        let resolution = options
            .resolution
            .clone()
            .unwrap_or_else(|| self.resolution.clone());
        validate_resolution(&resolution)?;

        let target = match options.target.as_deref() {
            Some(t) if t.starts_with("ws://") || t.starts_with("wss://") => {
                CaptureTarget::Debugger(t.to_string())
            }
            Some(t) if is_display_name(t) => CaptureTarget::ExistingDisplay(t.to_string()),
            Some(t) => {
                return Err(ConfigError::BadTarget(format!(
                    "expected a ws:// debugger URL or an X display like :99, got {:?}",
                    t
                )))
            }
            None => CaptureTarget::OwnedDisplay,
        };

        let backend = match target {
            CaptureTarget::Debugger(_) => BackendKind::Sampler,
            _ => BackendKind::Streaming,
        };

        let manual = options.manual.unwrap_or(false);
        if manual && backend != BackendKind::Sampler {
            return Err(ConfigError::ManualWithoutDebugger);
        }

        let display = match &target {
            CaptureTarget::ExistingDisplay(d) => d.clone(),
            _ => options.display.clone().unwrap_or_else(|| self.display.clone()),
        };
        validate_display(&display)?;

        let output_path = match &options.output {
            Some(o) => PathBuf::from(o),
            None => self.recordings_dir.join(format!(
                "recording_{}.mp4",
                Local::now().format("%Y%m%d_%H%M%S")
            )),
        };

        let config = SessionConfig {
            backend,
            target,
            display,
            resolution,
            fps,
            manual,
            output_path,
            frame_dir: self.frame_dir(),
            spawn_grace: Duration::from_secs(self.spawn_grace_secs),
            stop_timeout: Duration::from_secs(self.stop_timeout_secs),
            drain_timeout: Duration::from_secs(self.drain_timeout_secs),
        };
        debug!("Resolved session configuration: {:?}", config);
        Ok(config)
    }
}

fn validate_fps(fps: u32) -> Result<(), ConfigError> {
    if !(1..=60).contains(&fps) {
        return Err(ConfigError::NotInRange(format!(
            "fps must be between 1 and 60, got {}",
            fps
        )));
    }
    Ok(())
}

fn validate_resolution(resolution: &str) -> Result<(), ConfigError> {
    // WxH, e.g. 1920x1080
    let re = Regex::new(r"^\d{2,5}x\d{2,5}$").unwrap();
    if !re.is_match(resolution) {
        return Err(ConfigError::BadResolution(format!(
            "expected WxH like 1920x1080, got {:?}",
            resolution
        )));
    }
    Ok(())
}

fn validate_display(display: &str) -> Result<(), ConfigError> {
    if !is_display_name(display) {
        return Err(ConfigError::BadDisplay(format!(
            "expected an X display like :99, got {:?}",
            display
        )));
    }
    Ok(())
}

fn is_display_name(s: &str) -> bool {
    let re = Regex::new(r"^:\d+$").unwrap();
    re.is_match(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> SessionOptions {
        SessionOptions::default()
    }

    #[test]
    fn default_configuration_is_valid() {
        let config = RecorderConfig::default();
        config.validate().expect("defaults should validate");
        assert_eq!(config.fps, 15);
        assert_eq!(config.display, ":99");
        assert_eq!(config.resolution, "1920x1080");
    }

    #[test]
    fn no_target_resolves_to_owned_display_streaming() {
        let config = RecorderConfig::default();
        let session = config.resolve(&opts()).unwrap();
        assert_eq!(session.backend, BackendKind::Streaming);
        assert_eq!(session.target, CaptureTarget::OwnedDisplay);
        assert_eq!(session.display, ":99");
    }

    #[test]
    fn display_target_attaches_to_existing_display() {
        let config = RecorderConfig::default();
        let session = config
            .resolve(&SessionOptions {
                target: Some(":7".to_string()),
                ..opts()
            })
            .unwrap();
        assert_eq!(session.backend, BackendKind::Streaming);
        assert_eq!(
            session.target,
            CaptureTarget::ExistingDisplay(":7".to_string())
        );
        assert_eq!(session.display, ":7");
    }

    #[test]
    fn websocket_target_selects_sampler() {
        let config = RecorderConfig::default();
        let session = config
            .resolve(&SessionOptions {
                target: Some("ws://127.0.0.1:9222/devtools/page/1".to_string()),
                fps: Some(10),
                ..opts()
            })
            .unwrap();
        assert_eq!(session.backend, BackendKind::Sampler);
        assert_eq!(session.fps, 10);
        assert_eq!(session.frame_interval().as_millis(), 100);
    }

    #[test]
    fn garbage_target_is_rejected() {
        let config = RecorderConfig::default();
        let err = config
            .resolve(&SessionOptions {
                target: Some("ftp://nope".to_string()),
                ..opts()
            })
            .unwrap_err();
        assert!(matches!(err, ConfigError::BadTarget(_)));
    }

    #[test]
    fn fps_out_of_range_is_rejected() {
        let config = RecorderConfig::default();
        for fps in [0, 61, 1000] {
            let err = config
                .resolve(&SessionOptions {
                    fps: Some(fps),
                    ..opts()
                })
                .unwrap_err();
            assert!(matches!(err, ConfigError::NotInRange(_)), "fps {}", fps);
        }
    }

    #[test]
    fn bad_resolution_is_rejected() {
        let config = RecorderConfig::default();
        let err = config
            .resolve(&SessionOptions {
                resolution: Some("fullhd".to_string()),
                ..opts()
            })
            .unwrap_err();
        assert!(matches!(err, ConfigError::BadResolution(_)));
    }

    #[test]
    fn manual_mode_requires_debugger_target() {
        let config = RecorderConfig::default();
        let err = config
            .resolve(&SessionOptions {
                manual: Some(true),
                ..opts()
            })
            .unwrap_err();
        assert!(matches!(err, ConfigError::ManualWithoutDebugger));

        let session = config
            .resolve(&SessionOptions {
                target: Some("ws://127.0.0.1:9222/devtools/page/1".to_string()),
                manual: Some(true),
                ..opts()
            })
            .unwrap();
        assert!(session.manual);
    }

    #[test]
    fn explicit_output_is_kept_as_given() {
        let config = RecorderConfig::default();
        let session = config
            .resolve(&SessionOptions {
                output: Some("t.mp4".to_string()),
                ..opts()
            })
            .unwrap();
        assert_eq!(session.output_path, PathBuf::from("t.mp4"));
    }

    #[test]
    fn missing_output_gets_a_timestamped_name() {
        let config = RecorderConfig::default();
        let session = config.resolve(&opts()).unwrap();
        let name = session.output_path.file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("recording_"));
        assert!(name.ends_with(".mp4"));
        assert!(session.output_path.starts_with(&config.recordings_dir));
    }

    #[test]
    fn from_file_reads_toml_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reel.toml");
        std::fs::write(&path, "fps = 30\ndisplay = \":42\"\nport = 7000\n").unwrap();

        let config = RecorderConfig::from_file(&path).unwrap();
        assert_eq!(config.fps, 30);
        assert_eq!(config.display, ":42");
        assert_eq!(config.port, 7000);
        // Untouched fields keep their defaults
        assert_eq!(config.resolution, "1920x1080");
    }

    #[test]
    fn from_file_rejects_bad_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reel.toml");
        std::fs::write(&path, "display = \"primary\"\n").unwrap();

        let err = RecorderConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::BadDisplay(_)));
    }
}
