use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::asr::{SessionConfig, StreamingSpeech};
use crate::error::RelayError;
use crate::pump::{PumpExit, run_pump};
use crate::reformat::{Reformat, ReformatConfig, run_reformatter};
use crate::source;
use crate::transcoder::PcmSource;
use crate::{FormattedMessage, PipelineState};

/// Output channel depth between the pipeline and the broadcast side.
const OUT_CHANNEL_DEPTH: usize = 256;

/// Upper bound on draining the remaining backend results during shutdown.
const DRAIN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// PLS playlist URL naming the live audio stream.
    pub playlist_url: String,
    /// Bytes per audio pump read. Latency tuning only, not correctness.
    pub chunk_bytes: usize,
    pub session: SessionConfig,
    pub reformat: ReformatConfig,
}

/// Wires the pipeline stages together and owns their lifecycle.
///
/// One instance, one run. The state machine (`Starting → Running → Stopping
/// → Stopped`) lives in a single watch channel: `stop()` advances it, the
/// pump observes it, and transitions never go backwards, so a second stop
/// (from the operator, or from a failure racing the operator) is a no-op.
pub struct Pipeline {
    config: PipelineConfig,
    pcm: Arc<dyn PcmSource>,
    speech: Arc<dyn StreamingSpeech>,
    reformatter: Option<Arc<dyn Reformat>>,
    state_tx: watch::Sender<PipelineState>,
    /// Taken by the first `run()`; handing it to the reformatter stage lets
    /// the output channel close when the run ends.
    out_tx: Mutex<Option<mpsc::Sender<FormattedMessage>>>,
}

impl Pipeline {
    /// Creates the pipeline and the receiving end of its output channel.
    /// Nothing runs until [`Pipeline::run`] is called.
    pub fn new(
        config: PipelineConfig,
        pcm: Arc<dyn PcmSource>,
        speech: Arc<dyn StreamingSpeech>,
        reformatter: Option<Arc<dyn Reformat>>,
    ) -> (Self, mpsc::Receiver<FormattedMessage>) {
        let (out_tx, out_rx) = mpsc::channel(OUT_CHANNEL_DEPTH);
        let (state_tx, _) = watch::channel(PipelineState::Starting);

        let pipeline = Self {
            config,
            pcm,
            speech,
            reformatter,
            state_tx,
            out_tx: Mutex::new(Some(out_tx)),
        };

        (pipeline, out_rx)
    }

    pub fn state(&self) -> PipelineState {
        *self.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<PipelineState> {
        self.state_tx.subscribe()
    }

    /// Requests a graceful stop. Idempotent: once the pipeline is stopping
    /// (or already stopped), further calls change nothing.
    pub fn stop(&self) {
        let advanced = self.state_tx.send_if_modified(|state| {
            if *state < PipelineState::Stopping {
                *state = PipelineState::Stopping;
                true
            } else {
                false
            }
        });

        if advanced {
            info!("Pipeline stop requested");
        }
    }

    /// Resolves the source, starts every stage, and runs until the stream
    /// ends, a stage fails, or [`Pipeline::stop`] is called. Returns once
    /// the pipeline has reached `Stopped`.
    ///
    /// Startup failures abort with a single error; failures while running
    /// (transcoder death, speech session loss) shut the pipeline down
    /// gracefully instead.
    pub async fn run(&self) -> Result<(), RelayError> {
        let result = self.run_inner().await;

        self.transition(PipelineState::Stopped);
        match &result {
            Ok(()) => info!("Pipeline stopped"),
            Err(e) => error!(error = %e, "Pipeline failed"),
        }

        result
    }

    async fn run_inner(&self) -> Result<(), RelayError> {
        let out_tx = self
            .out_tx
            .lock()
            .await
            .take()
            .ok_or(RelayError::AlreadyStarted)?;

        // Starting: resolve the stream, then bring the stages up back to
        // front so nothing produces into a stage that does not exist yet.
        let http = reqwest::Client::new();
        let stream = source::resolve(&http, &self.config.playlist_url).await?;

        let handle = self.pcm.open(&stream.resolved_media_url).await?;
        let (reader, mut transcoder) = handle.split();

        let (audio_tx, segment_rx) = self.speech.open_stream(&self.config.session).await?;

        let reformatter = tokio::spawn(run_reformatter(
            segment_rx,
            out_tx,
            self.reformatter.clone(),
            Duration::from_millis(self.config.reformat.timeout_ms),
        ));

        self.transition(PipelineState::Running);
        info!(stream = %stream.resolved_media_url, "Pipeline running");

        let pump = tokio::spawn(run_pump(
            reader,
            audio_tx.clone(),
            self.state_tx.subscribe(),
            self.config.chunk_bytes,
        ));

        // The pump returns on its own for a stop request (it watches the
        // state channel) as well as for EOF and backend loss.
        let pump_exit = match pump.await {
            Ok(exit) => exit,
            Err(e) => {
                warn!(%e, "Pump task failed");
                PumpExit::Stopped
            }
        };

        self.transition(PipelineState::Stopping);
        match pump_exit {
            PumpExit::StreamEnded => warn!("Transcoded stream ended, stopping pipeline"),
            PumpExit::BackendClosed => warn!("Speech session closed, stopping pipeline"),
            PumpExit::Stopped => info!("Shutting down"),
        }

        // Dropping the audio sender is the session's one flush-and-close
        // call; the pump's clone is already gone.
        drop(audio_tx);

        if let Some(t) = transcoder.as_mut() {
            t.stop().await;
        }

        // The backend drains its remaining results into the reformatter,
        // which runs dry once the segment stream ends.
        join_with_grace(reformatter, "reformatter").await;

        Ok(())
    }

    fn transition(&self, next: PipelineState) {
        self.state_tx.send_if_modified(|state| {
            if *state < next {
                *state = next;
                true
            } else {
                false
            }
        });
    }
}

/// Awaits a draining stage, aborting it if the grace period expires (a
/// backend that never closes its stream must not wedge shutdown).
async fn join_with_grace(mut handle: JoinHandle<()>, stage: &'static str) {
    match timeout(DRAIN_GRACE, &mut handle).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(stage, %e, "Stage task failed"),
        Err(_) => {
            warn!(stage, "Stage did not drain within grace period, aborting");
            handle.abort();
        }
    }
}
