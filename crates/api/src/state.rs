use std::sync::Arc;

use airscribe_relay::Pipeline;

use crate::ws::storage::SubscriberStorage;

#[derive(Clone)]
pub struct AppState {
    pub subscribers: Arc<SubscriberStorage>,
    pub pipeline: Arc<Pipeline>,
}
