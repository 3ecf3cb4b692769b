//! Webhook handshake, signature verification and envelope parsing.

use {
    hmac::{Hmac, Mac},
    sha2::Sha256,
    tracing::{debug, warn},
};

use crate::{
    Error, Result,
    types::{InboundMessage, WebhookPayload},
};

type HmacSha256 = Hmac<Sha256>;

/// Answer the subscription handshake. Returns the challenge to echo back when
/// `mode` is `subscribe` and the token matches, `None` otherwise.
#[must_use]
pub fn verify_subscription(
    mode: Option<&str>,
    token: Option<&str>,
    challenge: Option<&str>,
    expected_token: &str,
) -> Option<String> {
    if mode != Some("subscribe") || expected_token.is_empty() {
        return None;
    }
    let token = token?;
    if !constant_time_eq(token.as_bytes(), expected_token.as_bytes()) {
        return None;
    }
    Some(challenge.unwrap_or_default().to_string())
}

/// Verify the `X-Hub-Signature-256` header (`sha256=<hex>`) over the raw body.
#[must_use]
pub fn verify_signature(body: &[u8], signature_header: &str, app_secret: &str) -> bool {
    let Some(expected) = signature_header.trim().strip_prefix("sha256=") else {
        warn!("invalid signature header format (missing sha256= prefix)");
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(app_secret.as_bytes()) else {
        warn!("failed to create HMAC");
        return false;
    };
    mac.update(body);
    let computed = hex::encode(mac.finalize().into_bytes());

    constant_time_eq(computed.as_bytes(), expected.to_ascii_lowercase().as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Parse a raw webhook body.
pub fn parse_payload(body: &[u8]) -> Result<WebhookPayload> {
    serde_json::from_slice(body).map_err(Error::invalid_payload)
}

/// Collect the messages in a payload addressed to `phone_number_id`.
///
/// Changes other than `messages` (delivery statuses and the like) are
/// ignored. A message that does not parse is skipped with a warning.
#[must_use]
pub fn inbound_messages(payload: &WebhookPayload, phone_number_id: &str) -> Vec<InboundMessage> {
    let mut out = Vec::new();
    for entry in &payload.entry {
        for change in &entry.changes {
            if change.field != "messages" {
                debug!(field = %change.field, "ignoring non-message webhook");
                continue;
            }

            let value = &change.value;
            if let Some(ref metadata) = value.metadata
                && !phone_number_id.is_empty()
                && metadata.phone_number_id != phone_number_id
            {
                warn!(
                    expected = %phone_number_id,
                    received = %metadata.phone_number_id,
                    "phone number ID mismatch"
                );
                continue;
            }

            out.extend(parse_messages(&value.messages));
        }
    }
    out
}

/// Parse raw message objects one by one, skipping the malformed ones.
pub(crate) fn parse_messages(raw: &[serde_json::Value]) -> Vec<InboundMessage> {
    raw.iter()
        .filter_map(
            |value| match serde_json::from_value::<InboundMessage>(value.clone()) {
                Ok(msg) => Some(msg),
                Err(e) => {
                    warn!(error = %Error::invalid_payload(e), "skipping malformed message");
                    None
                },
            },
        )
        .collect()
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    fn sign(body: &[u8], secret: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn subscription_echoes_challenge() {
        assert_eq!(
            verify_subscription(Some("subscribe"), Some("tok"), Some("123"), "tok"),
            Some("123".into())
        );
    }

    #[test]
    fn subscription_rejects_wrong_token_or_mode() {
        assert_eq!(
            verify_subscription(Some("subscribe"), Some("nope"), Some("1"), "tok"),
            None
        );
        assert_eq!(
            verify_subscription(Some("unsubscribe"), Some("tok"), Some("1"), "tok"),
            None
        );
        assert_eq!(verify_subscription(Some("subscribe"), None, Some("1"), "tok"), None);
        // An unconfigured verify token never matches, not even an empty one.
        assert_eq!(verify_subscription(Some("subscribe"), Some(""), Some("1"), ""), None);
    }

    #[test]
    fn signature_roundtrip() {
        let body = br#"{"entry":[]}"#;
        assert!(verify_signature(body, &sign(body, "s3cret"), "s3cret"));
        assert!(!verify_signature(body, &sign(body, "other"), "s3cret"));
        assert!(!verify_signature(body, "deadbeef", "s3cret"));
        assert!(!verify_signature(b"tampered", &sign(body, "s3cret"), "s3cret"));
    }

    #[test]
    fn malformed_body_is_invalid_payload() {
        assert!(matches!(
            parse_payload(b"{not json"),
            Err(Error::InvalidPayload { .. })
        ));
    }

    #[test]
    fn extracts_messages_and_skips_bad_ones() {
        let payload: WebhookPayload = serde_json::from_value(json!({
            "entry": [{
                "changes": [
                    {"field": "statuses", "value": {}},
                    {"field": "messages", "value": {
                        "metadata": {"phone_number_id": "PN1"},
                        "messages": [
                            {"id": "m1", "from": "611111", "timestamp": "1", "type": "text", "text": {"body": "hi"}},
                            {"from": "611111"},
                            {"id": "m2", "from": "611111", "timestamp": "2", "type": "text", "text": {"body": "yo"}}
                        ]
                    }}
                ]
            }]
        }))
        .unwrap();

        let msgs = inbound_messages(&payload, "PN1");
        let ids: Vec<_> = msgs.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["m1", "m2"]);
    }

    #[test]
    fn other_phone_number_is_ignored() {
        let payload: WebhookPayload = serde_json::from_value(json!({
            "entry": [{"changes": [{"field": "messages", "value": {
                "metadata": {"phone_number_id": "OTHER"},
                "messages": [{"id": "m1", "from": "1", "type": "text", "text": {"body": "hi"}}]
            }}]}]
        }))
        .unwrap();
        assert!(inbound_messages(&payload, "PN1").is_empty());
    }
}
