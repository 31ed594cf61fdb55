//! Capture subsystem.
//!
//! Two capture strategies behind one [`CaptureBackend`] trait:
//! [`StreamingEncoder`] continuously encodes a live X display with ffmpeg,
//! [`FrameSampler`] pulls periodic screenshots over the browser debugger
//! connection and batch-encodes them at session end. The streaming variant
//! has no capture loop but needs an OS-level framebuffer; the sampler is
//! portable at the cost of the loop and a second encode pass.

pub mod backend;
pub mod cdp;
pub mod frame_sampler;
pub mod frame_store;
pub mod streaming_encoder;
pub mod video_encoder;

pub use backend::CaptureBackend;
pub use frame_sampler::FrameSampler;
pub use frame_store::FrameStore;
pub use streaming_encoder::StreamingEncoder;
