pub mod deepgram;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::TranscriptSegment;
use crate::error::RelayError;

/// Options for one streaming recognition session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Recognition model identifier.
    pub model: String,
    /// Language hint (e.g. "en-US").
    pub language: String,
    /// Ask the backend for punctuation and number formatting.
    pub smart_format: bool,
    /// Forward interim (non-final) results as segments. Off = final-only.
    pub forward_interim: bool,
    /// Audio sample rate in Hz. The pipeline always produces 16 kHz.
    pub sample_rate: u32,
    /// Channel count. The pipeline always produces mono.
    pub channels: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: "nova-2".to_string(),
            language: "en-US".to_string(),
            smart_format: true,
            forward_interim: false,
            sample_rate: crate::transcoder::SAMPLE_RATE,
            channels: crate::transcoder::CHANNELS,
        }
    }
}

/// A live speech recognition session.
///
/// Audio goes in through the returned sender as raw PCM frames; segments
/// come out of the receiver asynchronously, driven by the backend rather
/// than by the caller's sends. Dropping the sender is the one
/// flush-and-close call per session: the backend finishes any in-flight
/// audio, delivers its remaining segments, and ends the receiver stream.
#[async_trait]
pub trait StreamingSpeech: Send + Sync + 'static {
    async fn open_stream(
        &self,
        config: &SessionConfig,
    ) -> Result<(mpsc::Sender<Vec<u8>>, mpsc::Receiver<TranscriptSegment>), RelayError>;

    /// Human-readable backend name.
    fn name(&self) -> &str;
}
