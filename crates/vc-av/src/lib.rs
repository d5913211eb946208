//! vc-av: everything that touches the external encoder.
//!
//! - [`ToolRegistry`]: where ffmpeg, ffprobe and the fallback encoder live
//! - [`ToolCommand`]: async process builder
//! - [`probe`]: input duration and frame information via ffprobe
//! - [`progress`]: status-line codec, parser and percentage tracker
//! - [`encoder`]: the primary and fallback encoding strategies
//! - [`EncoderDriver`]: runs strategies as child processes with fallback

pub mod command;
pub mod driver;
pub mod encoder;
pub mod probe;
pub mod progress;
pub mod tools;
pub mod workspace;

pub use command::{ToolCommand, ToolOutput};
pub use driver::{EncodeRequest, EncodeSummary, EncoderDriver};
pub use encoder::{EncoderBackend, Invocation};
pub use probe::MediaProbe;
pub use progress::{ProgressSample, ProgressTracker, ProgressUpdate};
pub use tools::{ToolInfo, ToolRegistry};
pub use workspace::AttemptWorkspace;
