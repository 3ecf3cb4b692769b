//! Outbound text messages with bounded retry.

use std::time::Duration;

use {async_trait::async_trait, taskbridge_config::ResponderConfig, tracing::warn};

use crate::Result;

/// Sends one text message. Implementations make exactly one attempt; retrying
/// is [`send_with_retry`]'s job.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Returns the provider message ID of the sent message.
    async fn send_text(&self, to: &str, text: &str) -> Result<String>;
}

/// Fixed-delay retry bound for transient send failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total tries, including the first. Never less than one.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    #[must_use]
    pub fn from_config(config: &ResponderConfig) -> Self {
        Self::new(config.max_attempts, config.retry_delay())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ResponderConfig::default())
    }
}

/// A delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub message_id: String,
    pub attempts: u32,
}

/// Send `text` to `to`, retrying transient failures up to the policy bound.
/// Non-transient errors are returned after the first attempt.
pub async fn send_with_retry(
    sender: &dyn MessageSender,
    to: &str,
    text: &str,
    policy: RetryPolicy,
) -> Result<SendReceipt> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match sender.send_text(to, text).await {
            Ok(message_id) => {
                return Ok(SendReceipt {
                    message_id,
                    attempts: attempt,
                });
            },
            Err(err) if err.is_transient() && attempt < max_attempts => {
                warn!(
                    to,
                    attempt,
                    max_attempts,
                    retry_delay_ms = policy.delay.as_millis() as u64,
                    error = %err,
                    "send failed, retrying"
                );
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            },
            Err(err) => {
                warn!(
                    to,
                    attempt,
                    max_attempts,
                    transient = err.is_transient(),
                    error = %err,
                    "send failed, giving up"
                );
                return Err(err);
            },
        }
    }
}
