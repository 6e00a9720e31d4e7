use crate::config::GatewaySettings;
use crate::fanout::FanoutQueue;
use crate::feed::FeedReader;
use crate::gateway::DeliveryGateway;
use crate::store::PostStore;
use std::sync::Arc;

/// Shared handles for request handlers and live sessions
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PostStore>,
    pub reader: FeedReader,
    pub fanout: FanoutQueue,
    pub gateway: DeliveryGateway,
    pub gateway_settings: GatewaySettings,
}
