//! Typewire renders growing blocks of lightly marked-up text as a paced
//! typewriter video, streamed through an ffmpeg subprocess or shown in a
//! local preview window.

pub mod encoding;
pub mod error;
pub mod fonts;
pub mod interrupt;
pub mod layout;
pub mod manifest;
pub mod markup;
#[cfg(feature = "preview")]
pub mod play;
pub mod render;
pub mod reveal;
pub mod schema;
pub mod scroll;
pub mod session;
pub mod sink;
pub mod timing;

pub use error::{StreamError, StreamResult};
pub use schema::SessionConfig;
pub use session::{BlockSummary, SessionState, StreamSession};
pub use sink::{FrameSink, MemorySink, OutputSink, SinkStatus};
pub use timing::Pacing;
