//! Gateway: the HTTP server hosting the WhatsApp webhook, and the supervisor
//! that runs the poller and processor loops beside it.
//!
//! Lifecycle:
//! 1. Load + validate config (done by the caller)
//! 2. Open the task store, build the provider client
//! 3. Spawn the processor loop and, when a listing URL is set, the poller
//! 4. Serve `/webhook` and `/health` until ctrl-c
//! 5. Cancel the loops and wait for them to stop

pub mod server;
pub mod state;
pub mod webhook;

pub use {
    server::{build_app, start_gateway},
    state::GatewayState,
};
