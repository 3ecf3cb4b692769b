//! Config schema types for the bridge.
use std::{path::PathBuf, time::Duration};

use {secrecy::Secret, serde::Deserialize};

/// Root configuration. Built once at startup and shared read-only.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub server: ServerConfig,
    pub whatsapp: WhatsAppConfig,
    pub access: AccessConfig,
    pub poller: PollerConfig,
    pub processor: ProcessorConfig,
    pub responder: ResponderConfig,
    pub queue: QueueConfig,
}

/// Webhook server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to. Defaults to "127.0.0.1".
    pub bind: String,
    /// Port to listen on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8080,
        }
    }
}

/// WhatsApp Cloud API credentials and endpoints.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct WhatsAppConfig {
    /// Bearer token for the Graph API.
    pub access_token: Secret<String>,

    /// Business phone number ID used as the sender for outbound messages.
    pub phone_number_id: String,

    /// Shared secret echoed back during the webhook subscription handshake.
    pub verify_token: Secret<String>,

    /// App secret for `X-Hub-Signature-256` verification. Signatures are not
    /// checked when unset.
    pub app_secret: Option<Secret<String>>,

    /// Graph API base, without trailing slash.
    pub api_base_url: String,

    /// Per-request timeout for provider calls.
    pub request_timeout_secs: u64,
}

impl WhatsAppConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl std::fmt::Debug for WhatsAppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhatsAppConfig")
            .field("access_token", &"[REDACTED]")
            .field("phone_number_id", &self.phone_number_id)
            .field("verify_token", &"[REDACTED]")
            .field(
                "app_secret",
                &self.app_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("api_base_url", &self.api_base_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            access_token: Secret::new(String::new()),
            phone_number_id: String::new(),
            verify_token: Secret::new(String::new()),
            app_secret: None,
            api_base_url: "https://graph.facebook.com/v21.0".into(),
            request_timeout_secs: 15,
        }
    }
}

/// Which senders may create tasks.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Phone numbers or chat IDs. `*` globs are supported. An empty list
    /// rejects everyone.
    pub allowed_senders: Vec<String>,
}

/// Offline poller that recovers messages missed by the webhook.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Listing endpoint. The poller stays off when unset.
    pub list_url: Option<String>,
    pub interval_secs: u64,
}

impl PollerConfig {
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.list_url.as_deref().is_some_and(|u| !u.trim().is_empty())
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            list_url: None,
            interval_secs: 30,
        }
    }
}

/// Task processor loop.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// How often the processor looks for pending tasks.
    pub interval_secs: u64,
    /// Reply to the sender once a task has been processed.
    pub ack_replies: bool,
    /// Context template wrapped around each task before it is emitted.
    /// Placeholders: `{id}`, `{category}`, `{source_id}`, `{body}`, `{created_at}`.
    pub task_template: String,
    /// Acknowledgement reply. Same placeholders as `task_template`.
    pub ack_template: String,
}

impl ProcessorConfig {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

pub const DEFAULT_TASK_TEMPLATE: &str = "# Task {id} ({category})\n\
From: {source_id}\n\
Received: {created_at}\n\
\n\
{body}\n";

pub const DEFAULT_ACK_TEMPLATE: &str = "Task #{id} received ({category}).";

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 2,
            ack_replies: true,
            task_template: DEFAULT_TASK_TEMPLATE.into(),
            ack_template: DEFAULT_ACK_TEMPLATE.into(),
        }
    }
}

/// Outbound retry policy. Bounded: `max_attempts` tries with a fixed delay.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResponderConfig {
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

impl ResponderConfig {
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_ms: 2_000,
        }
    }
}

/// Where the queue files live.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub data_dir: Option<PathBuf>,
}

impl QueueConfig {
    /// The configured data directory, or the platform default.
    #[must_use]
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(crate::loader::default_data_dir)
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use {super::*, secrecy::ExposeSecret};

    #[test]
    fn defaults() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.poller.interval_secs, 30);
        assert!(!cfg.poller.enabled());
        assert_eq!(cfg.responder.max_attempts, 3);
        assert!(cfg.processor.ack_replies);
        assert!(cfg.access.allowed_senders.is_empty());
    }

    #[test]
    fn deserialize_partial_toml() {
        let raw = r#"
[whatsapp]
access_token = "EAAG"
phone_number_id = "1234"
verify_token = "hush"

[access]
allowed_senders = ["+61 111 111", "6122*"]

[poller]
list_url = "https://relay.example.com/messages"
"#;
        let cfg: BridgeConfig = toml::from_str(raw).unwrap();
        assert_eq!(cfg.whatsapp.access_token.expose_secret(), "EAAG");
        assert_eq!(cfg.whatsapp.verify_token.expose_secret(), "hush");
        assert!(cfg.whatsapp.app_secret.is_none());
        assert_eq!(cfg.access.allowed_senders.len(), 2);
        assert!(cfg.poller.enabled());
        // untouched sections keep their defaults
        assert_eq!(cfg.server.bind, "127.0.0.1");
        assert_eq!(cfg.whatsapp.request_timeout_secs, 15);
    }

    #[test]
    fn blank_list_url_disables_poller() {
        let cfg = PollerConfig {
            list_url: Some("  ".into()),
            ..Default::default()
        };
        assert!(!cfg.enabled());
    }

    #[test]
    fn debug_redacts_secrets() {
        let cfg = WhatsAppConfig {
            access_token: Secret::new("super-secret-token".into()),
            app_secret: Some(Secret::new("app-secret".into())),
            ..Default::default()
        };
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("super-secret-token"));
        assert!(!rendered.contains("app-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
