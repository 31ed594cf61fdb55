//! Recording session lifecycle.
//!
//! A [`SessionController`] owns at most one recording [`Session`] at a time and
//! moves it through `Idle -> Starting -> Recording -> Stopping -> Idle`, parking
//! in `Failed` when a stage breaks. It also writes a crash marker on disk while
//! processes are running so a later run can clean up after an unclean exit
//! (see [`recovery`]).
//!
//! Re-exports:
//! - [`SessionController`]: start/stop/frame/reset entry point.
//! - [`Session`], [`SessionState`], [`FrameOutcome`]: core types.
//! - [`SessionMarker`]: on-disk crash marker.

pub mod recovery;
pub mod session;
pub mod session_controller;

pub use recovery::SessionMarker;
pub use session::{Session, SessionState};
pub use session_controller::{FrameOutcome, SessionController};
