//! WhatsApp Cloud API plumbing for the bridge.
//!
//! Inbound: webhook handshake, signature check and envelope parsing, plus a
//! listing client the poller uses to recover missed messages. Outbound: a
//! text-message client and a bounded retry wrapper around it.

pub mod access;
pub mod client;
pub mod error;
pub mod outbound;
pub mod source;
pub mod types;
pub mod webhook;

pub use {
    access::{AccessDenied, check_access, normalize_sender},
    client::WhatsAppClient,
    error::{Error, Result},
    outbound::{MessageSender, RetryPolicy, SendReceipt, send_with_retry},
    source::{HttpMessageSource, ListedMessages, MessageSource},
    types::{InboundMessage, WebhookPayload},
};
