//! Live audio recording over the binary channel
//!
//! A connection toggles recording with `start_recording` / `stop_recording`
//! text frames; binary frames in between are appended to a sink in arrival
//! order.

mod session;
mod sink;

pub use session::{AudioChunkSession, ControlSignal, Notice, RecordingSnapshot};
pub use sink::{AudioSink, FileSinkFactory, SinkFactory};
