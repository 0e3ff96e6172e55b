use std::sync::Arc;

use inbox_coordination::CoordinationStore;
use inbox_eventbus::EventBus;
use inbox_persistence::Persistence;
use inbox_providers::ProviderRegistry;
use tokio::sync::mpsc;

use crate::auth::AuthProvider;
use crate::config::Config;
use crate::jobs::{OutboundJob, WebhookJob};
use crate::socket::ConnectionRegistry;

/// Shared application state, handed to every HTTP handler and background
/// worker as an `Arc`. Mirrors the teacher's `AppState<R: SecretsResolver>`
/// shape, generalized from a single secrets-resolver type parameter to a
/// small bundle of collaborators this domain actually needs.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn Persistence>,
    pub coordination: Arc<CoordinationStore>,
    pub bus: Arc<EventBus>,
    pub providers: Arc<ProviderRegistry>,
    pub auth: Arc<AuthProvider>,
    pub connections: Arc<ConnectionRegistry>,
    pub webhook_jobs: mpsc::Sender<WebhookJob>,
    pub outbound_jobs: mpsc::Sender<OutboundJob>,
}
