//! Admission of inbound messages: authorization, control commands, enqueue.
//!
//! Nothing here touches the network, so the webhook can answer the provider
//! as soon as a message is admitted.

use std::sync::Arc;

use {
    taskbridge_queue::{Enqueued, NewTask, Task, TaskStore},
    taskbridge_whatsapp::{AccessDenied, InboundMessage, check_access},
    tracing::{debug, info},
};

use crate::{Result, commands::ControlCommand};

/// What became of one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accepted {
    /// Queued as a new pending task.
    Queued(Task),
    /// Already ingested by the webhook or the poller.
    Duplicate,
    /// Sender not allowed; dropped.
    Unauthorized(AccessDenied),
    /// A control command from an authorized sender. The caller answers it.
    Command(ControlCommand),
    /// Nothing to do: not a text message, or an empty one.
    Ignored,
}

#[derive(Clone)]
pub struct Intake {
    store: Arc<dyn TaskStore>,
    allowed_senders: Arc<Vec<String>>,
}

impl Intake {
    pub fn new(store: Arc<dyn TaskStore>, allowed_senders: Vec<String>) -> Self {
        Self {
            store,
            allowed_senders: Arc::new(allowed_senders),
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    pub fn authorize(&self, sender: &str) -> std::result::Result<(), AccessDenied> {
        check_access(&self.allowed_senders, sender)
    }

    pub async fn accept(&self, msg: &InboundMessage) -> Result<Accepted> {
        if let Err(reason) = self.authorize(&msg.from) {
            debug!(from = %msg.from, message_id = %msg.id, %reason, "dropping message");
            return Ok(Accepted::Unauthorized(reason));
        }

        let Some(body) = msg.text_body() else {
            debug!(message_id = %msg.id, msg_type = %msg.message_type, "ignoring non-text message");
            return Ok(Accepted::Ignored);
        };

        if let Some(command) = ControlCommand::parse(body) {
            // Recorded so the poller does not queue it later.
            if !self.store.mark_seen(&msg.id).await? {
                return Ok(Accepted::Duplicate);
            }
            debug!(from = %msg.from, command = command.as_str(), "control command");
            return Ok(Accepted::Command(command));
        }

        let new = NewTask::new(&msg.from, body).with_message_id(&msg.id);
        match self.store.enqueue(new).await? {
            Enqueued::Created(task) => {
                info!(task_id = task.id, from = %task.source_id, "task queued");
                Ok(Accepted::Queued(task))
            },
            Enqueued::Duplicate {
                provider_message_id,
            } => {
                debug!(message_id = %provider_message_id, "duplicate message");
                Ok(Accepted::Duplicate)
            },
        }
    }
}
