//! Process management subsystem.
//!
//! Wraps the external processes the recorder supervises (Xvfb, ffmpeg,
//! ChromeDriver) behind [`ProcessHandle`], which gives every child the same
//! spawn-with-grace-window, graceful-stop and force-kill semantics.
//!
//! Re-exports:
//! - [`ProcessHandle`]: one spawned child process.
//! - [`VirtualDisplay`]: Xvfb lifecycle plus the `xdpyinfo` readiness probe.
//! - [`wait_until_ready`]: bounded readiness polling shared by all probes.

pub mod display;
pub mod process_handle;
pub mod readiness;

pub use display::VirtualDisplay;
pub use process_handle::ProcessHandle;
pub use readiness::wait_until_ready;
