use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;
use tokio::process::{Child, ChildStdout, Command};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::RelayError;

/// Fixed target format: 16 kHz mono signed 16-bit little-endian PCM.
pub const SAMPLE_RATE: u32 = 16_000;
pub const CHANNELS: u32 = 1;
pub const BYTES_PER_SAMPLE: u32 = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscoderConfig {
    /// Transcoder binary to invoke.
    pub ffmpeg_bin: String,
    /// How long `stop()` waits for the child to exit before killing it.
    pub stop_grace_ms: u64,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_bin: "ffmpeg".to_string(),
            stop_grace_ms: 2_000,
        }
    }
}

/// Owns the external transcoding process.
///
/// Exactly one ffmpeg child per instance, its stdout exposed as the PCM byte
/// stream. If the child dies on its own, reads return EOF; the pump treats
/// that as a terminal condition and the coordinator shuts the run down. The
/// supervisor never restarts the child itself.
pub struct Transcoder {
    child: Option<Child>,
    grace: Duration,
}

impl Transcoder {
    /// Launches the transcoder reading `media_url` and emitting raw PCM in
    /// the fixed target format on stdout. Diagnostic output is suppressed.
    pub fn spawn(media_url: &str, config: &TranscoderConfig) -> Result<Self, RelayError> {
        let child = Command::new(&config.ffmpeg_bin)
            .arg("-i")
            .arg(media_url)
            .args(["-f", "s16le", "-acodec", "pcm_s16le"])
            .arg("-ar")
            .arg(SAMPLE_RATE.to_string())
            .arg("-ac")
            .arg(CHANNELS.to_string())
            .args(["-loglevel", "quiet", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(RelayError::TranscoderSpawn)?;

        info!(bin = %config.ffmpeg_bin, %media_url, "Transcoder started");

        Ok(Self {
            child: Some(child),
            grace: Duration::from_millis(config.stop_grace_ms),
        })
    }

    /// Takes the child's stdout. Yields EOF once the process exits.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.as_mut().and_then(|child| child.stdout.take())
    }

    /// Terminates the child. Safe to call any number of times; after the
    /// grace period an unresponsive child is force-killed rather than waited
    /// on.
    pub async fn stop(&mut self) {
        let Some(mut child) = self.child.take() else {
            debug!("Transcoder already stopped");
            return;
        };

        if let Err(e) = child.start_kill() {
            debug!(%e, "Transcoder already exited");
        }

        match timeout(self.grace, child.wait()).await {
            Ok(Ok(status)) => debug!(%status, "Transcoder stopped"),
            Ok(Err(e)) => warn!(%e, "Failed to reap transcoder"),
            Err(_) => {
                warn!("Transcoder did not exit within grace period, killing");
                if let Err(e) = child.kill().await {
                    warn!(%e, "Failed to kill transcoder");
                }
            }
        }
    }
}

/// An open PCM byte stream together with the transcoder that produces it.
/// Sources that are not process-backed (tests) carry no transcoder.
pub struct PcmHandle {
    reader: Box<dyn AsyncRead + Send + Unpin>,
    transcoder: Option<Transcoder>,
}

impl PcmHandle {
    pub fn from_reader(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            reader: Box::new(reader),
            transcoder: None,
        }
    }

    pub fn from_transcoder(mut transcoder: Transcoder) -> Result<Self, RelayError> {
        let stdout = transcoder
            .take_stdout()
            .ok_or_else(|| RelayError::TranscoderSpawn(std::io::Error::other("stdout not captured")))?;
        Ok(Self {
            reader: Box::new(stdout),
            transcoder: Some(transcoder),
        })
    }

    pub fn split(self) -> (Box<dyn AsyncRead + Send + Unpin>, Option<Transcoder>) {
        (self.reader, self.transcoder)
    }
}

/// A live source of PCM bytes in the fixed target format.
#[async_trait]
pub trait PcmSource: Send + Sync + 'static {
    async fn open(&self, media_url: &str) -> Result<PcmHandle, RelayError>;
}

/// The production source: one ffmpeg child per opened stream.
pub struct FfmpegSource {
    config: TranscoderConfig,
}

impl FfmpegSource {
    pub fn new(config: TranscoderConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PcmSource for FfmpegSource {
    async fn open(&self, media_url: &str) -> Result<PcmHandle, RelayError> {
        let transcoder = Transcoder::spawn(media_url, &self.config)?;
        PcmHandle::from_transcoder(transcoder)
    }
}
