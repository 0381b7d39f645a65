use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::{FormattedMessage, TranscriptSegment};

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReformatConfig {
    pub model: String,
    /// System prompt for the one-line cleanup request.
    pub system_prompt: String,
    /// Upper bound on one reformatting call. On expiry the raw text is used.
    pub timeout_ms: u64,
}

impl Default for ReformatConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            system_prompt: "You clean up live radio transcriptions. Rewrite the transmission \
                            as a single readable line: use digits for spoken numbers, standard \
                            notation for identifiers, and keep the meaning unchanged. Reply \
                            with the rewritten line only."
                .to_string(),
            timeout_ms: 10_000,
        }
    }
}

/// A single text-normalization call against an external backend.
///
/// Implementations may fail however they like; the worker treats every
/// failure the same way and falls back to the original text.
#[async_trait]
pub trait Reformat: Send + Sync + 'static {
    async fn reformat(&self, text: &str) -> anyhow::Result<String>;

    /// Human-readable backend name.
    fn name(&self) -> &str;
}

/// OpenAI-compatible chat-completions reformatter.
pub struct OpenAiReformat {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    system_prompt: String,
}

impl OpenAiReformat {
    pub fn new(api_key: String, config: &ReformatConfig) -> Self {
        Self::with_endpoint(DEFAULT_ENDPOINT.to_string(), api_key, config)
    }

    /// Points the client at a non-default endpoint (self-hosted or proxy).
    pub fn with_endpoint(endpoint: String, api_key: String, config: &ReformatConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[async_trait]
impl Reformat for OpenAiReformat {
    async fn reformat(&self, text: &str) -> anyhow::Result<String> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": self.system_prompt},
                {"role": "user", "content": text},
            ],
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .first()
            .map(|choice| choice.message.content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| anyhow::anyhow!("empty completion"))
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// Drains the segment queue in arrival order, emitting one message per
/// segment.
///
/// A single worker keeps broadcast order identical to emission order, and
/// the queue absorbs recognition bursts while a call is in flight. Every
/// call is bounded by `call_timeout`; timeouts and errors alike fall back to
/// the original text and are never surfaced as pipeline errors. With no
/// backend configured, segments pass through unchanged on the same path.
pub async fn run_reformatter(
    mut segment_rx: mpsc::Receiver<TranscriptSegment>,
    out_tx: mpsc::Sender<FormattedMessage>,
    backend: Option<Arc<dyn Reformat>>,
    call_timeout: Duration,
) {
    while let Some(segment) = segment_rx.recv().await {
        let display_text = match &backend {
            Some(backend) => match timeout(call_timeout, backend.reformat(&segment.text)).await {
                Ok(Ok(text)) => text,
                Ok(Err(e)) => {
                    warn!(backend = backend.name(), %e, "Reformatting failed, using raw text");
                    segment.text.clone()
                }
                Err(_) => {
                    warn!(backend = backend.name(), "Reformatting timed out, using raw text");
                    segment.text.clone()
                }
            },
            None => segment.text.clone(),
        };

        let message = FormattedMessage {
            original_text: segment.text,
            display_text,
        };

        if out_tx.send(message).await.is_err() {
            debug!("Output channel closed, reformatter exiting");
            return;
        }
    }

    debug!("Segment queue drained, reformatter exiting");
}
