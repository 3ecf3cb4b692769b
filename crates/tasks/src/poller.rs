//! Offline poller: recovers messages the webhook never delivered.

use std::{sync::Arc, time::Duration};

use {
    taskbridge_queue::{NewTask, TaskStore},
    taskbridge_whatsapp::{MessageSource, check_access},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{Result, commands::ControlCommand};

/// Tally of one poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollOutcome {
    /// Messages returned by the listing endpoint.
    pub listed: usize,
    /// Tasks created; everything else was a duplicate or filtered out.
    pub created: usize,
    /// Items that failed to parse.
    pub malformed: usize,
    pub unauthorized: usize,
    /// Older than the cursor.
    pub stale: usize,
    /// Non-text messages and control commands, which are not replayed.
    pub skipped: usize,
    pub cursor: Option<i64>,
}

pub struct Poller {
    store: Arc<dyn TaskStore>,
    source: Arc<dyn MessageSource>,
    allowed_senders: Vec<String>,
    interval: Duration,
}

impl Poller {
    pub fn new(
        store: Arc<dyn TaskStore>,
        source: Arc<dyn MessageSource>,
        allowed_senders: Vec<String>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            source,
            allowed_senders,
            interval,
        }
    }

    /// List messages since the stored cursor and enqueue the new ones.
    ///
    /// The batch and the advanced cursor are written under one lock. If that
    /// write fails the cursor stays where it was and the next poll lists the
    /// same messages again; dedup keeps any tasks that did land from doubling.
    pub async fn poll_once(&self) -> Result<PollOutcome> {
        let cursor = self.store.cursor().await?;
        let listed = self.source.list_since(cursor).await?;

        let mut outcome = PollOutcome {
            listed: listed.messages.len() + listed.skipped,
            malformed: listed.skipped,
            cursor,
            ..Default::default()
        };
        let mut batch = Vec::new();

        for msg in listed.messages {
            // Same-second messages can straddle the cursor, so equal
            // timestamps are kept; dedup by message ID covers the overlap.
            if let (Some(c), Some(ts)) = (cursor, msg.timestamp)
                && ts < c
            {
                outcome.stale += 1;
                continue;
            }
            if let Some(ts) = msg.timestamp {
                outcome.cursor = Some(outcome.cursor.map_or(ts, |c| c.max(ts)));
            }

            if let Err(reason) = check_access(&self.allowed_senders, &msg.from) {
                debug!(from = %msg.from, message_id = %msg.id, %reason, "poller dropping message");
                outcome.unauthorized += 1;
                continue;
            }
            let Some(body) = msg.text_body() else {
                outcome.skipped += 1;
                continue;
            };
            if ControlCommand::parse(body).is_some() {
                // A stale command is not worth answering.
                outcome.skipped += 1;
                continue;
            }

            batch.push(NewTask::new(&msg.from, body).with_message_id(&msg.id));
        }

        let created = self.store.enqueue_batch(batch, outcome.cursor).await?;
        outcome.created = created.len();
        for task in &created {
            info!(task_id = task.id, from = %task.source_id, "task recovered by poller");
        }
        Ok(outcome)
    }

    /// Poll every `interval` until cancelled. Errors are logged and the next
    /// tick tries again.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "poller started");
        loop {
            match self.poll_once().await {
                Ok(outcome) if outcome.created > 0 || outcome.malformed > 0 => {
                    info!(
                        created = outcome.created,
                        listed = outcome.listed,
                        malformed = outcome.malformed,
                        unauthorized = outcome.unauthorized,
                        cursor = ?outcome.cursor,
                        "poll finished"
                    );
                },
                Ok(outcome) => debug!(listed = outcome.listed, "poll found nothing new"),
                Err(e) => warn!(error = %e, "poll failed, retrying next interval"),
            }

            tokio::select! {
                () = tokio::time::sleep(self.interval) => {},
                () = cancel.cancelled() => break,
            }
        }
        info!("poller stopped");
    }
}
