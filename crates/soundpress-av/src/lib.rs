//! Audio tooling for soundpress: external tool discovery, the ffmpeg
//! command wrapper, compression presets, input validation, and the
//! [`Transcoder`] abstraction used by the job engine.

pub mod command;
pub mod presets;
pub mod probe;
pub mod tools;
pub mod transcode;
pub mod validate;

pub use command::{ToolCommand, ToolOutput};
pub use presets::Preset;
pub use tools::{ToolInfo, ToolRegistry};
pub use transcode::{FfmpegTranscoder, TranscodeEvent, TranscodeRequest, Transcoder};
