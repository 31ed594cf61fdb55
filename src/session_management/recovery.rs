use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

use crate::capture::frame_store;
use crate::error_handling::types::SessionError;
use crate::process_management::wait_until_ready;

/// One child process recorded in the crash-recovery marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkedProcess {
    pub name: String,
    pub pid: u32,
}

/// Liveness marker persisted while a session's backing processes run.
///
/// Written when the processes are spawned, removed once they are confirmed
/// stopped. Finding one at startup means the previous run exited uncleanly
/// and its children may still be alive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMarker {
    pub session_id: Uuid,
    pub processes: Vec<MarkedProcess>,
    pub output_path: PathBuf,
    pub written_at: DateTime<Utc>,
}

impl SessionMarker {
    pub fn new(session_id: Uuid, processes: Vec<MarkedProcess>, output_path: PathBuf) -> Self {
        Self {
            session_id,
            processes,
            output_path,
            written_at: Utc::now(),
        }
    }

    pub fn write(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, contents)?;
        debug!("Session marker written to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> std::io::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        serde_json::from_str(&contents)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    pub fn remove(path: &Path) {
        match std::fs::remove_file(path) {
            Ok(()) => debug!("Session marker removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove session marker {}: {}", path.display(), e),
        }
    }
}

/// Signal-0 liveness probe.
pub fn pid_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

/// Terminates a leftover pid: SIGTERM, bounded wait, then SIGKILL.
pub async fn terminate_pid(name: &str, pid: u32) {
    if !pid_alive(pid) {
        debug!("{} (pid {}) is already gone", name, pid);
        return;
    }

    warn!("Terminating leftover {} process (pid {})", name, pid);
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGTERM);
    }
    let exited = wait_until_ready(
        name,
        Duration::from_secs(5),
        Duration::from_millis(200),
        move || async move { !pid_alive(pid) },
    )
    .await;
    if !exited {
        warn!("{} (pid {}) ignored SIGTERM, sending SIGKILL", name, pid);
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGKILL);
        }
    }
}

/// Recovers from an unclean shutdown before the controller accepts new work.
///
/// Terminates every pid listed in the marker, reports whether the recorded
/// artifact actually exists on disk (a stale path is never trusted), purges
/// the stale frame directory and removes the marker. A corrupt marker is
/// discarded: the pid list is gone either way and refusing to start would
/// not bring it back.
pub async fn recover(marker_path: &Path, frame_dir: &Path) -> Result<(), SessionError> {
    if !marker_path.exists() {
        debug!("No session marker found, previous shutdown was clean");
        return Ok(());
    }

    warn!("Unclean shutdown detected, recovering previous session");
    let marker = match SessionMarker::load(marker_path) {
        Ok(marker) => marker,
        Err(e) => {
            warn!("Session marker is unreadable ({}), discarding it", e);
            SessionMarker::remove(marker_path);
            frame_store::purge_dir(frame_dir);
            return Ok(());
        }
    };

    info!(
        "[{}] recovering session from {} ({} process(es))",
        marker.session_id,
        marker.written_at,
        marker.processes.len()
    );
    for process in &marker.processes {
        terminate_pid(&process.name, process.pid).await;
    }

    if marker.output_path.exists() {
        info!(
            "[{}] interrupted recording left an artifact at {}",
            marker.session_id,
            marker.output_path.display()
        );
    } else {
        warn!(
            "[{}] no artifact was produced at {}",
            marker.session_id,
            marker.output_path.display()
        );
    }

    frame_store::purge_dir(frame_dir);
    std::fs::remove_file(marker_path).map_err(|e| {
        SessionError::RecoveryFailed(format!(
            "could not remove session marker {}: {}",
            marker_path.display(),
            e
        ))
    })?;
    info!("[{}] recovery complete", marker.session_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker_with(processes: Vec<MarkedProcess>) -> SessionMarker {
        SessionMarker::new(Uuid::new_v4(), processes, PathBuf::from("/tmp/out.mp4"))
    }

    #[test]
    fn marker_roundtrips_through_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("reel-session.json");
        let marker = marker_with(vec![MarkedProcess {
            name: "Xvfb".to_string(),
            pid: 4242,
        }]);

        marker.write(&path).unwrap();
        let loaded = SessionMarker::load(&path).unwrap();
        assert_eq!(loaded.session_id, marker.session_id);
        assert_eq!(loaded.processes.len(), 1);
        assert_eq!(loaded.processes[0].pid, 4242);
        assert_eq!(loaded.output_path, marker.output_path);
    }

    #[test]
    fn remove_tolerates_a_missing_marker() {
        let tmp = tempfile::tempdir().unwrap();
        SessionMarker::remove(&tmp.path().join("nope.json"));
    }

    #[tokio::test]
    async fn recover_without_a_marker_is_a_noop() {
        let tmp = tempfile::tempdir().unwrap();
        recover(&tmp.path().join("marker.json"), &tmp.path().join("frames"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn corrupt_marker_is_discarded() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("marker.json");
        std::fs::write(&path, "{ not json").unwrap();

        recover(&path, &tmp.path().join("frames")).await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn recover_terminates_listed_processes_and_purges_state() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("marker.json");
        let frames = tmp.path().join("frames");
        std::fs::create_dir_all(&frames).unwrap();
        std::fs::write(frames.join("frame_000000.png"), b"stale").unwrap();

        let mut child = std::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .unwrap();
        let pid = child.id();
        assert!(pid_alive(pid));

        // Reap the child as soon as it dies so it does not linger as a zombie
        let reaper = std::thread::spawn(move || {
            let _ = child.wait();
        });

        marker_with(vec![MarkedProcess {
            name: "sleep".to_string(),
            pid,
        }])
        .write(&path)
        .unwrap();

        recover(&path, &frames).await.unwrap();
        reaper.join().unwrap();

        assert!(!path.exists());
        assert!(!frames.exists());
        assert!(!pid_alive(pid));
    }

    #[test]
    fn pid_alive_detects_our_own_process() {
        assert!(pid_alive(std::process::id()));
        // Largest positive pid value, far above any real pid_max
        assert!(!pid_alive(i32::MAX as u32));
    }
}
