//! Chat channel (Slack).
//!
//! Inbound webhook payload types, and the outbound handle the gateway uses to post replies
//! back into the conversation an event came from.

mod handle;
mod inbound;
mod slack;

pub use handle::ChannelHandle;
pub use inbound::{InboundPayload, MessageEvent, PayloadType};
pub use slack::{RelayError, SlackChannel, SLACK_API_BASE};
