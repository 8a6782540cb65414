pub mod error;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg_source;
pub mod fingerprint;
pub mod frame;
pub mod locate;
pub mod pipeline;
pub mod sink;
pub mod source;
pub mod state_machine;

pub use error::VideoError;
pub use fingerprint::Fingerprint;
pub use frame::{resize_keep_width, Frame};
pub use locate::{list_videos, locate_video};
pub use pipeline::{KeyframeRecord, KeyframeScanner, ScanAction, ScanConfig, ScanEvent, ScanReport};
pub use sink::{encode_jpeg, DirectorySink, Keyframe, KeyframeSink, MemorySink};
pub use source::{open_video, FrameSource, MemoryFrameSource};
pub use state_machine::{CaptureKind, Stabilizer, StabilizerConfig};
