use thiserror::Error;

/// Failure classes of the relay pipeline.
///
/// The first four only occur while the pipeline is starting and abort it
/// with a single diagnostic. `SpeechSession` is the one running-state error
/// value; everything else that can go wrong mid-run (transcoder death,
/// per-segment noise, reformat failures, listener drops) is handled in
/// place and never becomes an error.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to resolve playlist '{url}': {reason}")]
    PlaylistResolve { url: String, reason: String },

    #[error("pipeline already started")]
    AlreadyStarted,

    #[error("missing credential: {0} is not set")]
    MissingCredential(&'static str),

    #[error("failed to spawn transcoder: {0}")]
    TranscoderSpawn(#[source] std::io::Error),

    #[error("failed to open speech session: {0}")]
    SpeechConnect(String),

    #[error("speech session failed: {0}")]
    SpeechSession(String),
}
