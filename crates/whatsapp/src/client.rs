//! Cloud API client for outbound text messages.

use {
    async_trait::async_trait,
    reqwest::{Client, StatusCode},
    secrecy::{ExposeSecret, Secret},
    taskbridge_config::WhatsAppConfig,
    tracing::debug,
};

use crate::{
    Error, Result,
    outbound::MessageSender,
    types::{SendResponse, SendTextRequest},
};

/// Sends messages through `POST <api_base>/<phone_number_id>/messages`.
#[derive(Clone)]
pub struct WhatsAppClient {
    http: Client,
    messages_url: String,
    access_token: Secret<String>,
}

impl std::fmt::Debug for WhatsAppClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhatsAppClient")
            .field("messages_url", &self.messages_url)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

impl WhatsAppClient {
    pub fn from_config(config: &WhatsAppConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::external("failed to build http client", e))?;
        Ok(Self::with_client(http, config))
    }

    #[must_use]
    pub fn with_client(http: Client, config: &WhatsAppConfig) -> Self {
        Self {
            http,
            messages_url: format!(
                "{}/{}/messages",
                config.api_base_url.trim_end_matches('/'),
                config.phone_number_id
            ),
            access_token: config.access_token.clone(),
        }
    }

    #[must_use]
    pub fn messages_url(&self) -> &str {
        &self.messages_url
    }
}

/// 429 and 5xx are worth retrying; other failures are final.
pub(crate) fn classify_status(status: StatusCode, body: String) -> Error {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Error::transient(Some(status.as_u16()), format!("status {status}: {body}"))
    } else {
        Error::Rejected {
            status: status.as_u16(),
            body,
        }
    }
}

#[async_trait]
impl MessageSender for WhatsAppClient {
    async fn send_text(&self, to: &str, text: &str) -> Result<String> {
        let resp = self
            .http
            .post(&self.messages_url)
            .bearer_auth(self.access_token.expose_secret())
            .json(&SendTextRequest::new(to, text))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        let sent: SendResponse = resp.json().await.map_err(Error::invalid_payload)?;
        let message_id = sent
            .messages
            .into_iter()
            .next()
            .map(|m| m.id)
            .ok_or_else(|| Error::invalid_payload("send response has no message id"))?;
        debug!(to, %message_id, "message sent");
        Ok(message_id)
    }
}
