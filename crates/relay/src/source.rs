use tracing::info;

use crate::error::RelayError;

/// The live stream behind a playlist. Resolved once while the pipeline is
/// starting and immutable afterwards; pointing at a different stream is a
/// restart, not a mutation.
#[derive(Debug, Clone)]
pub struct StreamSource {
    pub playlist_url: String,
    pub resolved_media_url: String,
}

/// Fetches a PLS playlist and extracts the stream URL from its `File1=`
/// entry. Any HTTP failure, non-success status, or missing entry is an
/// unrecoverable startup error.
pub async fn resolve(
    client: &reqwest::Client,
    playlist_url: &str,
) -> Result<StreamSource, RelayError> {
    let resolve_err = |reason: String| RelayError::PlaylistResolve {
        url: playlist_url.to_string(),
        reason,
    };

    let response = client
        .get(playlist_url)
        .send()
        .await
        .map_err(|e| resolve_err(e.to_string()))?;

    if !response.status().is_success() {
        return Err(resolve_err(format!("HTTP {}", response.status())));
    }

    let body = response.text().await.map_err(|e| resolve_err(e.to_string()))?;

    let media_url = parse_stream_url(&body)
        .ok_or_else(|| resolve_err("no File1= entry in playlist".to_string()))?;

    info!(%playlist_url, %media_url, "Stream URL resolved");

    Ok(StreamSource {
        playlist_url: playlist_url.to_string(),
        resolved_media_url: media_url,
    })
}

/// Returns the value of the first `File1=` line, trimmed of surrounding
/// whitespace.
pub fn parse_stream_url(body: &str) -> Option<String> {
    body.lines()
        .find_map(|line| line.strip_prefix("File1="))
        .map(|url| url.trim().to_string())
}
