use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Top-level settings, layered from `config/default.toml`, an optional
/// `config/{RUN_MODE}.toml`, and `AIRSCRIBE__*` environment variables
/// (double underscore separates nesting, e.g. `AIRSCRIBE__SERVER__PORT`).
///
/// API credentials are not part of this tree; the binary reads them from
/// plain environment variables (`DEEPGRAM_API_KEY`, `OPENAI_API_KEY`).
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub stream: StreamSettings,
    #[serde(default)]
    pub speech: SpeechSettings,
    #[serde(default)]
    pub reformat: ReformatSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamSettings {
    /// PLS playlist URL naming the live audio stream (`File1=` entry).
    pub playlist_url: String,
    /// Bytes per audio pump read. Latency tuning only, not correctness.
    #[serde(default = "default_chunk_bytes")]
    pub chunk_bytes: usize,
    /// Transcoder binary to invoke.
    #[serde(default = "default_ffmpeg_bin")]
    pub ffmpeg_bin: String,
    /// How long `stop()` waits for the transcoder to exit before killing it.
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpeechSettings {
    /// Recognition model identifier.
    #[serde(default = "default_speech_model")]
    pub model: String,
    /// Language hint for the recognition session.
    #[serde(default = "default_language")]
    pub language: String,
    /// Ask the backend for punctuation and number formatting.
    #[serde(default = "default_true")]
    pub smart_format: bool,
    /// Forward interim (non-final) results. Off = final results only.
    #[serde(default)]
    pub forward_interim: bool,
    /// Override the backend WebSocket endpoint (self-hosted / proxy).
    #[serde(default)]
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReformatSettings {
    #[serde(default = "default_reformat_model")]
    pub model: String,
    /// System prompt for the one-line cleanup request.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Upper bound on one reformatting call before falling back to raw text.
    #[serde(default = "default_reformat_timeout_ms")]
    pub timeout_ms: u64,
    /// Override the chat-completions endpoint (self-hosted / proxy).
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        Config::builder()
            .add_source(File::with_name("config/default"))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(
                Environment::with_prefix("AIRSCRIBE")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            model: default_speech_model(),
            language: default_language(),
            smart_format: default_true(),
            forward_interim: false,
            endpoint: None,
        }
    }
}

impl Default for ReformatSettings {
    fn default() -> Self {
        Self {
            model: default_reformat_model(),
            system_prompt: default_system_prompt(),
            timeout_ms: default_reformat_timeout_ms(),
            endpoint: None,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8765
}

fn default_chunk_bytes() -> usize {
    4096
}

fn default_ffmpeg_bin() -> String {
    "ffmpeg".to_string()
}

fn default_stop_grace_ms() -> u64 {
    2_000
}

fn default_speech_model() -> String {
    "nova-2".to_string()
}

fn default_language() -> String {
    "en-US".to_string()
}

fn default_true() -> bool {
    true
}

fn default_reformat_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_system_prompt() -> String {
    "You clean up live radio transcriptions. Rewrite the transmission as a \
     single readable line: use digits for spoken numbers, standard notation \
     for identifiers, and keep the meaning unchanged. Reply with the \
     rewritten line only."
        .to_string()
}

fn default_reformat_timeout_ms() -> u64 {
    10_000
}
