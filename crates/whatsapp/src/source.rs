//! Listing endpoint the poller uses to recover messages the webhook missed.

use {
    async_trait::async_trait,
    reqwest::Client,
    secrecy::{ExposeSecret, Secret},
    taskbridge_config::WhatsAppConfig,
    tracing::debug,
};

use crate::{
    Error, Result,
    client::classify_status,
    types::{InboundMessage, ListResponse},
    webhook::parse_messages,
};

/// Messages returned by one listing call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListedMessages {
    pub messages: Vec<InboundMessage>,
    /// Items that did not parse and were dropped.
    pub skipped: usize,
}

#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Messages newer than `since` (unix seconds). `None` lists from the start.
    async fn list_since(&self, since: Option<i64>) -> Result<ListedMessages>;
}

/// `GET <list_url>?since=<cursor>` with bearer auth, answered with
/// `{"messages": [...]}` of Cloud API message objects.
pub struct HttpMessageSource {
    http: Client,
    list_url: String,
    access_token: Secret<String>,
}

impl HttpMessageSource {
    pub fn new(list_url: impl Into<String>, config: &WhatsAppConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::external("failed to build http client", e))?;
        Ok(Self {
            http,
            list_url: list_url.into(),
            access_token: config.access_token.clone(),
        })
    }
}

#[async_trait]
impl MessageSource for HttpMessageSource {
    async fn list_since(&self, since: Option<i64>) -> Result<ListedMessages> {
        let mut req = self
            .http
            .get(&self.list_url)
            .bearer_auth(self.access_token.expose_secret());
        if let Some(since) = since {
            req = req.query(&[("since", since)]);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        let listing: ListResponse = resp.json().await.map_err(Error::invalid_payload)?;
        let total = listing.messages.len();
        let messages = parse_messages(&listing.messages);
        let skipped = total - messages.len();
        debug!(total, skipped, ?since, "listed provider messages");
        Ok(ListedMessages { messages, skipped })
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use {super::*, mockito::Matcher};

    fn config() -> WhatsAppConfig {
        WhatsAppConfig {
            access_token: Secret::new("tok".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn lists_since_cursor_and_skips_malformed() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/messages")
            .match_query(Matcher::UrlEncoded("since".into(), "100".into()))
            .match_header("authorization", "Bearer tok")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"messages":[
                    {"id":"m1","from":"611111","timestamp":"101","type":"text","text":{"body":"a"}},
                    {"timestamp":"102"},
                    {"id":"m3","from":"611111","timestamp":103,"type":"text","text":{"body":"c"}}
                ]}"#,
            )
            .create_async()
            .await;

        let source =
            HttpMessageSource::new(format!("{}/messages", server.url()), &config()).unwrap();
        let listed = source.list_since(Some(100)).await.unwrap();

        assert_eq!(listed.messages.len(), 2);
        assert_eq!(listed.skipped, 1);
        assert_eq!(listed.messages[1].timestamp, Some(103));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn first_poll_sends_no_cursor() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/messages")
            .match_query(Matcher::Missing)
            .with_status(200)
            .with_body(r#"{"messages":[]}"#)
            .create_async()
            .await;

        let source =
            HttpMessageSource::new(format!("{}/messages", server.url()), &config()).unwrap();
        assert!(source.list_since(None).await.unwrap().messages.is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/messages")
            .with_status(502)
            .create_async()
            .await;

        let source =
            HttpMessageSource::new(format!("{}/messages", server.url()), &config()).unwrap();
        assert!(source.list_since(None).await.unwrap_err().is_transient());
    }
}
