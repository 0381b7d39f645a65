pub mod asr;
pub mod coordinator;
pub mod error;
pub mod pump;
pub mod reformat;
pub mod source;
pub mod transcoder;

pub use coordinator::{Pipeline, PipelineConfig};
pub use error::RelayError;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One finalized utterance from the speech backend.
///
/// Segments with empty text never exist: the backend adapter drops them
/// before they enter the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub text: String,
    /// When the backend finalized the utterance.
    pub source_timestamp: DateTime<Utc>,
}

/// A segment after the reformatting stage. `display_text` equals
/// `original_text` whenever reformatting failed, timed out, or is disabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormattedMessage {
    pub original_text: String,
    pub display_text: String,
}

/// Process-wide pipeline lifecycle state.
///
/// Transitions are one-directional (`Starting → Running → Stopping →
/// Stopped`); the coordinator publishes them through a single watch channel
/// so every loop observes the same value. The derived ordering follows the
/// lifecycle, which is what makes `send_if_modified` transitions monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineState {
    Starting,
    Running,
    Stopping,
    Stopped,
}
