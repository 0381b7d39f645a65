use async_trait::async_trait;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tracing::{debug, info, warn};

use super::{SessionConfig, StreamingSpeech};
use crate::TranscriptSegment;
use crate::error::RelayError;

pub const DEFAULT_ENDPOINT: &str = "wss://api.deepgram.com/v1/listen";

/// Channel depth for audio in and segments out of one session. At the
/// default 4096-byte chunks this buffers roughly eight seconds of audio
/// before the pump feels backpressure.
const SESSION_CHANNEL_DEPTH: usize = 64;

/// Deepgram live-transcription backend over its streaming WebSocket
/// protocol.
///
/// One persistent socket per session. Two tasks drive it: a writer that
/// turns audio frames into binary messages (and announces end-of-audio with
/// `CloseStream`), and a reader that parses `Results` messages and enqueues
/// finalized segments. The reader does nothing heavier than parse-and-send,
/// so backend delivery is never stalled by downstream work.
pub struct DeepgramSpeech {
    endpoint: String,
    api_key: String,
}

impl DeepgramSpeech {
    pub fn new(api_key: String) -> Self {
        Self::with_endpoint(DEFAULT_ENDPOINT.to_string(), api_key)
    }

    /// Points the client at a non-default endpoint (self-hosted or proxy).
    pub fn with_endpoint(endpoint: String, api_key: String) -> Self {
        Self { endpoint, api_key }
    }

    fn session_url(&self, config: &SessionConfig) -> String {
        format!(
            "{}?model={}&language={}&encoding=linear16&sample_rate={}&channels={}&smart_format={}&interim_results={}",
            self.endpoint,
            config.model,
            config.language,
            config.sample_rate,
            config.channels,
            config.smart_format,
            config.forward_interim,
        )
    }
}

/// Wire shape of a live `Results` message, reduced to the fields we read.
#[derive(Debug, Deserialize)]
struct LiveResponse {
    #[serde(rename = "type")]
    kind: Option<String>,
    is_final: Option<bool>,
    channel: Option<LiveChannel>,
}

#[derive(Debug, Deserialize)]
struct LiveChannel {
    alternatives: Vec<LiveAlternative>,
}

#[derive(Debug, Deserialize)]
struct LiveAlternative {
    transcript: String,
}

#[async_trait]
impl StreamingSpeech for DeepgramSpeech {
    async fn open_stream(
        &self,
        config: &SessionConfig,
    ) -> Result<(mpsc::Sender<Vec<u8>>, mpsc::Receiver<TranscriptSegment>), RelayError> {
        let url = self.session_url(config);
        let mut request = url
            .into_client_request()
            .map_err(|e| RelayError::SpeechConnect(e.to_string()))?;
        request.headers_mut().insert(
            "Authorization",
            HeaderValue::from_str(&format!("Token {}", self.api_key))
                .map_err(|e| RelayError::SpeechConnect(e.to_string()))?,
        );

        let (socket, _) = connect_async(request)
            .await
            .map_err(|e| RelayError::SpeechConnect(e.to_string()))?;
        info!(model = %config.model, language = %config.language, "Speech session opened");

        let (mut sink, mut stream) = socket.split();
        let (audio_tx, mut audio_rx) = mpsc::channel::<Vec<u8>>(SESSION_CHANNEL_DEPTH);
        let (segment_tx, segment_rx) = mpsc::channel::<TranscriptSegment>(SESSION_CHANNEL_DEPTH);

        // Writer: audio frames in, binary messages out. Sender drop is the
        // flush-and-close signal.
        tokio::spawn(async move {
            while let Some(frame) = audio_rx.recv().await {
                if sink.send(Message::Binary(frame.into())).await.is_err() {
                    warn!("Speech socket closed while sending audio");
                    return;
                }
            }
            let _ = sink.send(Message::text(r#"{"type":"CloseStream"}"#)).await;
            let _ = sink.close().await;
            debug!("Audio forwarding finished, speech stream closed");
        });

        // Reader: parse result frames, enqueue segments.
        let forward_interim = config.forward_interim;
        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                let message = match frame {
                    Ok(m) => m,
                    Err(e) => {
                        warn!(%e, "Speech socket error");
                        break;
                    }
                };

                let text = match message {
                    Message::Text(text) => text,
                    Message::Close(_) => break,
                    _ => continue,
                };

                let response: LiveResponse = match serde_json::from_str(&text) {
                    Ok(r) => r,
                    Err(e) => {
                        debug!(%e, "Unparsable speech frame, skipping");
                        continue;
                    }
                };

                let Some(segment) = segment_from(&response, forward_interim) else {
                    continue;
                };

                if segment_tx.send(segment).await.is_err() {
                    break;
                }
            }
            info!("Speech session ended");
        });

        Ok((audio_tx, segment_rx))
    }

    fn name(&self) -> &str {
        "deepgram"
    }
}

/// Turns one `Results` message into a segment, or nothing: non-result
/// frames, interim results (unless forwarding them is on), empty
/// transcripts, and recognizer noise markers are all dropped here, at the
/// source.
fn segment_from(response: &LiveResponse, forward_interim: bool) -> Option<TranscriptSegment> {
    if response.kind.as_deref() != Some("Results") {
        return None;
    }
    if !forward_interim && !response.is_final.unwrap_or(false) {
        return None;
    }

    let transcript = response
        .channel
        .as_ref()?
        .alternatives
        .first()?
        .transcript
        .trim();

    if transcript.is_empty() || is_noise(transcript) {
        return None;
    }

    Some(TranscriptSegment {
        text: transcript.to_string(),
        source_timestamp: Utc::now(),
    })
}

/// Recognizer placeholder markers that should never reach listeners.
fn is_noise(text: &str) -> bool {
    (text.starts_with('[') && text.ends_with(']'))
        || (text.starts_with('(') && text.ends_with(')'))
}
