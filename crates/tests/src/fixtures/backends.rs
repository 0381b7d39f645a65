//! Fake pipeline backends: deterministic stand-ins for ffmpeg, the speech
//! backend, and the reformatting backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;

use airscribe_relay::asr::{SessionConfig, StreamingSpeech};
use airscribe_relay::error::RelayError;
use airscribe_relay::reformat::Reformat;
use airscribe_relay::transcoder::{PcmHandle, PcmSource};
use airscribe_relay::TranscriptSegment;

/// PCM source yielding a fixed byte buffer, then EOF. Records the media URL
/// it was opened with.
pub struct StaticPcm {
    pcm: Vec<u8>,
    pub opened_url: Mutex<Option<String>>,
}

impl StaticPcm {
    /// `bytes` of s16le silence.
    pub fn silence(bytes: usize) -> Self {
        Self {
            pcm: vec![0u8; bytes],
            opened_url: Mutex::new(None),
        }
    }
}

#[async_trait]
impl PcmSource for StaticPcm {
    async fn open(&self, media_url: &str) -> Result<PcmHandle, RelayError> {
        *self.opened_url.lock().unwrap() = Some(media_url.to_string());
        Ok(PcmHandle::from_reader(std::io::Cursor::new(self.pcm.clone())))
    }
}

/// PCM source that produces nothing and never ends, for tests that stop a
/// live pipeline.
pub struct PendingPcm;

#[async_trait]
impl PcmSource for PendingPcm {
    async fn open(&self, _media_url: &str) -> Result<PcmHandle, RelayError> {
        let (reader, writer) = tokio::io::duplex(64);
        // Leak the writer so the reader never sees EOF.
        std::mem::forget(writer);
        let reader: Box<dyn AsyncRead + Send + Unpin> = Box::new(reader);
        Ok(PcmHandle::from_reader(reader))
    }
}

/// Speech backend that counts audio frames and, once the audio ends, emits
/// a scripted list of segments.
pub struct ScriptedSpeech {
    lines: Vec<&'static str>,
    pub frames_seen: Arc<AtomicUsize>,
}

impl ScriptedSpeech {
    pub fn new(lines: Vec<&'static str>) -> Self {
        Self {
            lines,
            frames_seen: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl StreamingSpeech for ScriptedSpeech {
    async fn open_stream(
        &self,
        _config: &SessionConfig,
    ) -> Result<(mpsc::Sender<Vec<u8>>, mpsc::Receiver<TranscriptSegment>), RelayError> {
        let (audio_tx, mut audio_rx) = mpsc::channel::<Vec<u8>>(8);
        let (segment_tx, segment_rx) = mpsc::channel(8);

        let lines = self.lines.clone();
        let frames_seen = self.frames_seen.clone();
        tokio::spawn(async move {
            while audio_rx.recv().await.is_some() {
                frames_seen.fetch_add(1, Ordering::SeqCst);
            }
            for line in lines {
                let segment = TranscriptSegment {
                    text: line.to_string(),
                    source_timestamp: Utc::now(),
                };
                if segment_tx.send(segment).await.is_err() {
                    break;
                }
            }
        });

        Ok((audio_tx, segment_rx))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Reformatter returning a fixed line.
pub struct FixedReformat(pub &'static str);

#[async_trait]
impl Reformat for FixedReformat {
    async fn reformat(&self, _text: &str) -> anyhow::Result<String> {
        Ok(self.0.to_string())
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

/// Reformatter that always fails.
pub struct FailingReformat;

#[async_trait]
impl Reformat for FailingReformat {
    async fn reformat(&self, _text: &str) -> anyhow::Result<String> {
        Err(anyhow::anyhow!("simulated network error"))
    }

    fn name(&self) -> &str {
        "failing"
    }
}
