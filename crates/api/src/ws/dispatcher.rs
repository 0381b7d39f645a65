use std::sync::Arc;

use axum::extract::ws::Message;
use futures::SinkExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use airscribe_relay::FormattedMessage;

use super::storage::SubscriberStorage;

/// Broadcasts one transcription to every connected listener.
///
/// Best-effort: a listener whose send fails is dropped from the storage and
/// the broadcast continues with the rest. With no listeners connected this
/// is a no-op.
pub async fn broadcast(storage: &SubscriberStorage, message: &FormattedMessage) {
    let senders = storage.senders();
    if senders.is_empty() {
        return;
    }

    let text = serde_json::json!({ "transcription": message.display_text }).to_string();

    for (connection_id, sender) in senders {
        let mut guard = sender.lock().await;
        if let Err(e) = guard.send(Message::text(text.clone())).await {
            warn!(%connection_id, %e, "Failed to send to listener, dropping it");
            drop(guard);
            storage.remove(&connection_id);
        } else {
            debug!(%connection_id, "Transcription sent");
        }
    }
}

/// Drains the pipeline's output channel into the hub until the pipeline
/// ends.
pub async fn run_broadcast(
    storage: Arc<SubscriberStorage>,
    mut out_rx: mpsc::Receiver<FormattedMessage>,
) {
    while let Some(message) = out_rx.recv().await {
        info!(
            text = %message.display_text,
            listeners = storage.count(),
            "Broadcasting transcription"
        );
        broadcast(&storage, &message).await;
    }
    debug!("Pipeline output closed, broadcast task exiting");
}
