//! `/webhook` handlers.

use std::{collections::HashMap, sync::Arc};

use {
    axum::{
        body::Bytes,
        extract::{Query, State},
        http::{HeaderMap, StatusCode},
        response::{IntoResponse, Response},
    },
    secrecy::ExposeSecret,
    taskbridge_tasks::{Accepted, ControlCommand},
    taskbridge_whatsapp::webhook::{
        inbound_messages, parse_payload, verify_signature, verify_subscription,
    },
    tracing::{debug, error, info, warn},
};

use crate::state::GatewayState;

const SIGNATURE_HEADER: &str = "x-hub-signature-256";

fn param<'a>(query: &'a HashMap<String, String>, names: &[&str]) -> Option<&'a str> {
    names.iter().find_map(|n| query.get(*n)).map(String::as_str)
}

/// `GET /webhook`: subscription handshake.
pub async fn verify_handler(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let mode = param(&query, &["hub.mode", "mode"]);
    let token = param(&query, &["hub.verify_token", "verify_token", "token"]);
    let challenge = param(&query, &["hub.challenge", "challenge"]);

    match verify_subscription(
        mode,
        token,
        challenge,
        state.config.whatsapp.verify_token.expose_secret(),
    ) {
        Some(challenge) => {
            info!("webhook subscription verified");
            (StatusCode::OK, challenge).into_response()
        },
        None => {
            warn!(?mode, "webhook verification rejected");
            StatusCode::FORBIDDEN.into_response()
        },
    }
}

/// `POST /webhook`: inbound messages.
///
/// Answers as soon as messages are queued. Malformed bodies are acknowledged
/// so the provider does not keep redelivering them; a store failure is a 500
/// so it does.
pub async fn receive_handler(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if let Some(secret) = state.app_secret() {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok());
        let valid = signature.is_some_and(|sig| verify_signature(&body, sig, secret));
        if !valid {
            warn!(
                has_signature = signature.is_some(),
                "webhook signature check failed"
            );
            return StatusCode::FORBIDDEN;
        }
    }

    let payload = match parse_payload(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, bytes = body.len(), "ignoring malformed webhook body");
            return StatusCode::OK;
        },
    };

    let mut status = StatusCode::OK;
    for msg in inbound_messages(&payload, &state.config.whatsapp.phone_number_id) {
        match state.intake.accept(&msg).await {
            Ok(Accepted::Command(command)) => spawn_command_reply(&state, command, msg.from),
            Ok(accepted) => debug!(message_id = %msg.id, ?accepted, "webhook message handled"),
            Err(e) => {
                error!(message_id = %msg.id, error = %e, "failed to queue message");
                status = StatusCode::INTERNAL_SERVER_ERROR;
            },
        }
    }
    status
}

/// Replies go out in the background so the webhook never waits on the
/// provider.
fn spawn_command_reply(state: &Arc<GatewayState>, command: ControlCommand, to: String) {
    let state = Arc::clone(state);
    tokio::spawn(async move {
        let text = match command.reply(&*state.store).await {
            Ok(text) => text,
            Err(e) => {
                warn!(command = command.as_str(), error = %e, "failed to build command reply");
                return;
            },
        };
        if let Err(e) = state.responder.send(&to, &text).await {
            warn!(command = command.as_str(), to = %to, error = %e, "failed to send command reply");
        }
    });
}
