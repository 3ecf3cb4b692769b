use std::sync::Arc;

use {
    secrecy::ExposeSecret,
    taskbridge_config::BridgeConfig,
    taskbridge_queue::{FileTaskStore, TaskStore},
    taskbridge_tasks::{Intake, Responder},
    taskbridge_whatsapp::{MessageSender, RetryPolicy, WhatsAppClient},
};

/// Shared, read-only state behind every handler.
pub struct GatewayState {
    pub config: Arc<BridgeConfig>,
    pub store: Arc<dyn TaskStore>,
    pub intake: Intake,
    pub responder: Responder,
    pub version: String,
}

impl GatewayState {
    pub fn new(
        config: Arc<BridgeConfig>,
        store: Arc<dyn TaskStore>,
        sender: Arc<dyn MessageSender>,
    ) -> Arc<Self> {
        let intake = Intake::new(Arc::clone(&store), config.access.allowed_senders.clone());
        let responder = Responder::new(
            Arc::clone(&store),
            sender,
            RetryPolicy::from_config(&config.responder),
        );
        Arc::new(Self {
            config,
            store,
            intake,
            responder,
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    /// Production wiring: file-backed store under the data dir and the Cloud
    /// API client.
    pub fn from_config(config: Arc<BridgeConfig>) -> anyhow::Result<Arc<Self>> {
        let store: Arc<dyn TaskStore> =
            Arc::new(FileTaskStore::new(config.queue.resolved_data_dir()));
        let sender: Arc<dyn MessageSender> =
            Arc::new(WhatsAppClient::from_config(&config.whatsapp)?);
        Ok(Self::new(config, store, sender))
    }

    /// App secret for signature checks, when one is configured.
    #[must_use]
    pub fn app_secret(&self) -> Option<&str> {
        self.config
            .whatsapp
            .app_secret
            .as_ref()
            .map(|s| s.expose_secret().as_str())
            .filter(|s| !s.is_empty())
    }
}
