//! lookout-stream: video input and output around the recognition core.
//!
//! Opens RTSP streams through OpenCV's FFmpeg backend, samples and converts
//! frames, draws name labels and shows the result in a HighGUI window.

pub mod capture;
pub mod display;
pub mod frame;
pub mod overlay;
pub mod recovery;

pub use capture::{configure_transport, StreamError, StreamOptions, Transport, VideoStream};
pub use display::Window;
pub use frame::{FrameError, FrameSampler};
pub use recovery::{ReconnectPolicy, ReconnectState};
