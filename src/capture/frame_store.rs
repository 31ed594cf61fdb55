use log::{debug, warn};
use std::path::{Path, PathBuf};

/// Append-only numbered frame sequence on disk.
///
/// Frames are written as `frame_%06d.png` in capture order. The index only
/// advances on a successful write, so a session's indices are always exactly
/// `0..frame_count` with no gaps.
pub struct FrameStore {
    dir: PathBuf,
    next_index: u64,
}

impl FrameStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir, next_index: 0 }
    }

    /// Clears any frames left over from a previous session and resets the
    /// index. Called at the start of every recording.
    pub fn prepare(&mut self) -> std::io::Result<()> {
        if self.dir.exists() {
            std::fs::remove_dir_all(&self.dir)?;
        }
        std::fs::create_dir_all(&self.dir)?;
        self.next_index = 0;
        debug!("Frame directory ready at {}", self.dir.display());
        Ok(())
    }

    /// Writes one frame and returns its index.
    pub fn append(&mut self, data: &[u8]) -> std::io::Result<u64> {
        let index = self.next_index;
        let path = self.dir.join(format!("frame_{:06}.png", index));
        std::fs::write(&path, data)?;
        self.next_index += 1;
        Ok(index)
    }

    pub fn frame_count(&self) -> u64 {
        self.next_index
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// ffmpeg image2 input pattern for the sequence.
    pub fn pattern(&self) -> PathBuf {
        self.dir.join("frame_%06d.png")
    }

    /// Removes the frame directory and everything in it.
    pub fn purge(&mut self) {
        purge_dir(&self.dir);
        self.next_index = 0;
    }
}

/// Removes a frame directory without needing a live store (used by crash
/// recovery, which only knows the path).
pub fn purge_dir(dir: &Path) {
    if !dir.exists() {
        return;
    }
    if let Err(e) = std::fs::remove_dir_all(dir) {
        warn!("Failed to purge frame directory {}: {}", dir.display(), e);
    } else {
        debug!("Purged frame directory {}", dir.display());
    }
}

/// Counts frame files already on disk; used when the sampler task could not
/// report its count before the drain window expired.
pub fn count_frames(dir: &Path) -> u64 {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| {
                    e.file_name()
                        .to_string_lossy()
                        .starts_with("frame_")
                })
                .count() as u64
        })
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_are_gapless_and_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = FrameStore::new(tmp.path().join("frames"));
        store.prepare().unwrap();

        for expected in 0..5u64 {
            let index = store.append(b"png-bytes").unwrap();
            assert_eq!(index, expected);
        }
        assert_eq!(store.frame_count(), 5);
        assert_eq!(count_frames(store.dir()), 5);

        for i in 0..5 {
            assert!(store.dir().join(format!("frame_{:06}.png", i)).exists());
        }
    }

    #[test]
    fn prepare_discards_previous_frames() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = FrameStore::new(tmp.path().join("frames"));
        store.prepare().unwrap();
        store.append(b"old").unwrap();
        store.append(b"old").unwrap();

        store.prepare().unwrap();
        assert_eq!(store.frame_count(), 0);
        assert_eq!(count_frames(store.dir()), 0);
        // Indices restart from zero after a prepare
        assert_eq!(store.append(b"new").unwrap(), 0);
    }

    #[test]
    fn purge_removes_the_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = FrameStore::new(tmp.path().join("frames"));
        store.prepare().unwrap();
        store.append(b"frame").unwrap();

        store.purge();
        assert!(!store.dir().exists());
        assert_eq!(store.frame_count(), 0);
    }

    #[test]
    fn purge_dir_tolerates_missing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        purge_dir(&tmp.path().join("nope"));
    }
}
