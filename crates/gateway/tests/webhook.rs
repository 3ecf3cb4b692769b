#![allow(clippy::unwrap_used)]
//! End-to-end tests for the webhook routes.

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use {
    async_trait::async_trait,
    hmac::{Hmac, Mac},
    secrecy::Secret,
    sha2::Sha256,
    taskbridge_config::BridgeConfig,
    taskbridge_gateway::{GatewayState, build_app},
    taskbridge_queue::{FileTaskStore, TaskStatus, TaskStore},
    taskbridge_whatsapp::MessageSender,
    tempfile::TempDir,
    tokio::net::TcpListener,
};

/// Records outbound messages instead of calling the provider.
#[derive(Default)]
struct RecordingSender {
    sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send_text(&self, to: &str, text: &str) -> taskbridge_whatsapp::Result<String> {
        let mut sent = self.sent.lock().unwrap();
        sent.push((to.to_string(), text.to_string()));
        Ok(format!("wamid.out{}", sent.len()))
    }
}

struct TestServer {
    addr: SocketAddr,
    store: Arc<FileTaskStore>,
    sender: Arc<RecordingSender>,
    _tmp: TempDir,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }
}

async fn start_server(app_secret: Option<&str>) -> TestServer {
    let tmp = TempDir::new().unwrap();
    let mut config = BridgeConfig::default();
    config.whatsapp.phone_number_id = "PN1".into();
    config.whatsapp.verify_token = Secret::new("verify-me".into());
    config.whatsapp.app_secret = app_secret.map(|s| Secret::new(s.to_string()));
    config.access.allowed_senders = vec!["+61 411 111 111".into()];
    config.queue.data_dir = Some(tmp.path().to_path_buf());

    let store = Arc::new(FileTaskStore::new(tmp.path()));
    let sender = Arc::new(RecordingSender::default());
    let state = GatewayState::new(Arc::new(config), store.clone(), sender.clone());
    let app = build_app(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    TestServer {
        addr,
        store,
        sender,
        _tmp: tmp,
    }
}

fn text_payload(message_id: &str, from: &str, body: &str) -> String {
    serde_json::json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "WABA",
            "changes": [{
                "field": "messages",
                "value": {
                    "messaging_product": "whatsapp",
                    "metadata": {"display_phone_number": "15550001111", "phone_number_id": "PN1"},
                    "messages": [{
                        "from": from,
                        "id": message_id,
                        "timestamp": "1700000000",
                        "type": "text",
                        "text": {"body": body}
                    }]
                }
            }]
        }]
    })
    .to_string()
}

async fn post(server: &TestServer, body: String) -> reqwest::StatusCode {
    reqwest::Client::new()
        .post(server.url("/webhook"))
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .unwrap()
        .status()
}

#[tokio::test]
async fn verification_handshake() {
    let server = start_server(None).await;
    let client = reqwest::Client::new();

    let ok = client
        .get(server.url(
            "/webhook?hub.mode=subscribe&hub.verify_token=verify-me&hub.challenge=1158201444",
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(ok.status(), 200);
    assert_eq!(ok.text().await.unwrap(), "1158201444");

    let alias = client
        .get(server.url("/webhook?mode=subscribe&token=verify-me&challenge=abc"))
        .send()
        .await
        .unwrap();
    assert_eq!(alias.text().await.unwrap(), "abc");

    let denied = client
        .get(server.url("/webhook?hub.mode=subscribe&hub.verify_token=wrong&hub.challenge=1"))
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status(), 403);
}

#[tokio::test]
async fn authorized_message_is_queued_once() {
    let server = start_server(None).await;
    let payload = text_payload("wamid.A", "61411111111", "Build a script to rename files");

    assert_eq!(post(&server, payload.clone()).await, 200);
    // Provider redelivery.
    assert_eq!(post(&server, payload).await, 200);

    let tasks = server.store.list().await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].status, TaskStatus::Pending);
    assert_eq!(tasks[0].source_id, "61411111111");
    assert_eq!(tasks[0].provider_message_id.as_deref(), Some("wamid.A"));
    assert!(server.sender.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unauthorized_sender_is_acknowledged_and_dropped() {
    let server = start_server(None).await;
    let status = post(&server, text_payload("wamid.B", "19995550000", "let me in")).await;
    assert_eq!(status, 200);
    assert!(server.store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn status_command_is_answered_not_queued() {
    let server = start_server(None).await;
    let status = post(&server, text_payload("wamid.C", "61411111111", "status")).await;
    assert_eq!(status, 200);

    // The reply is sent in the background.
    let mut sent = Vec::new();
    for _ in 0..100 {
        sent = server.sender.sent.lock().unwrap().clone();
        if !sent.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "61411111111");
    assert!(sent[0].1.starts_with("Tasks: 0 pending"));
    assert!(server.store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn malformed_body_is_acknowledged() {
    let server = start_server(None).await;
    assert_eq!(post(&server, "{not json".into()).await, 200);
    assert!(server.store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn signature_is_enforced_when_app_secret_is_set() {
    let server = start_server(Some("app-secret")).await;
    let payload = text_payload("wamid.D", "61411111111", "note: buy milk");

    assert_eq!(post(&server, payload.clone()).await, 403);

    let mut mac = Hmac::<Sha256>::new_from_slice(b"app-secret").unwrap();
    mac.update(payload.as_bytes());
    let signature = format!("sha256={}", hex::encode(mac.finalize().into_bytes()));

    let status = reqwest::Client::new()
        .post(server.url("/webhook"))
        .header("content-type", "application/json")
        .header("x-hub-signature-256", signature)
        .body(payload)
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, 200);
    assert_eq!(server.store.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn health_reports_pending_count() {
    let server = start_server(None).await;
    post(&server, text_payload("wamid.E", "61411111111", "research llamas")).await;

    let health: serde_json::Value = reqwest::get(server.url("/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["pending"], 1);
    assert!(health["version"].is_string());
}
