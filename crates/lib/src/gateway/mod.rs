//! Gateway: the Slack Events webhook.
//!
//! A single HTTP port accepts signed event deliveries, acknowledges each one, and relays
//! new messages through the backend into the originating thread.

mod dispatcher;
mod server;
pub mod signature;

pub use dispatcher::{
    Ack, ValidationError, WebhookDispatcher, ACK_ALREADY_PROCESSED, ACK_HANDLED,
    DEFAULT_FALLBACK_TEXT,
};
pub use server::{build_state, router, run_gateway, serve, GatewayState};
