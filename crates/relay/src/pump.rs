use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::PipelineState;

/// Why the pump loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpExit {
    /// The transcoded byte stream reached end-of-file (transcoder gone).
    StreamEnded,
    /// The pipeline began stopping.
    Stopped,
    /// The transcription client's audio channel closed underneath us.
    BackendClosed,
}

/// Reads PCM chunks of up to `chunk_bytes` from `reader` and forwards each
/// non-empty chunk to the transcription client until EOF, shutdown, or
/// channel closure.
///
/// The shutdown watch is part of every read and every send, so stop latency
/// is bounded by one loop iteration rather than by how long the transcoder
/// or the backend keeps us blocked.
pub async fn run_pump<R>(
    mut reader: R,
    audio_tx: mpsc::Sender<Vec<u8>>,
    mut state_rx: watch::Receiver<PipelineState>,
    chunk_bytes: usize,
) -> PumpExit
where
    R: AsyncRead + Unpin + Send,
{
    let mut buf = vec![0u8; chunk_bytes];
    let mut forwarded: u64 = 0;

    loop {
        if *state_rx.borrow_and_update() >= PipelineState::Stopping {
            info!(forwarded, "Audio pump stopping on shutdown signal");
            return PumpExit::Stopped;
        }

        let read = tokio::select! {
            read = reader.read(&mut buf) => read,
            changed = state_rx.changed() => {
                if changed.is_err() {
                    return PumpExit::Stopped;
                }
                continue;
            }
        };

        match read {
            Ok(0) => {
                info!(forwarded, "Transcoded stream ended");
                return PumpExit::StreamEnded;
            }
            Ok(n) => {
                let frame = buf[..n].to_vec();
                tokio::select! {
                    sent = audio_tx.send(frame) => {
                        if sent.is_err() {
                            debug!(forwarded, "Audio channel closed, pump exiting");
                            return PumpExit::BackendClosed;
                        }
                        forwarded += 1;
                    }
                    changed = state_rx.changed() => {
                        // Shutdown raced the send; the frame is dropped.
                        if changed.is_err() {
                            return PumpExit::Stopped;
                        }
                    }
                }
            }
            Err(e) => {
                warn!(%e, "Audio read failed, treating as end of stream");
                return PumpExit::StreamEnded;
            }
        }
    }
}
