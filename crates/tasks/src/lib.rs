//! Task pipeline: intake of inbound messages, the offline poller, the
//! processor that categorizes and formats queued tasks, and the responder
//! that replies to senders.

pub mod category;
pub mod commands;
pub mod error;
pub mod format;
pub mod intake;
pub mod outbox;
pub mod poller;
pub mod processor;
pub mod responder;

pub use {
    category::{RULES, Rule, categorize},
    commands::ControlCommand,
    error::{Error, Result},
    format::render,
    intake::{Accepted, Intake},
    outbox::{Outbox, OutboxEntry},
    poller::{PollOutcome, Poller},
    processor::Processor,
    responder::Responder,
};
