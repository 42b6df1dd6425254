//! Webhook dispatcher: classify one inbound payload and, for a new message event, run it
//! through the backend and post the reply back in-thread.
//!
//! Every path ends in an [`Ack`]; nothing is returned as an error, because the provider
//! retries any delivery that does not get a 2xx answer.

use crate::channels::{ChannelHandle, InboundPayload, MessageEvent, PayloadType};
use crate::dedup::EventDeduplicator;
use crate::llm::{BackendError, ChatMessage, ReplyBackend};
use std::sync::Arc;

pub const ACK_HANDLED: &str = "Event handled";
pub const ACK_ALREADY_PROCESSED: &str = "Event already processed";
/// Posted in-thread when the backend fails or returns nothing.
pub const DEFAULT_FALLBACK_TEXT: &str = "Error processing the message.";

/// Response body for one webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ack {
    /// Handshake: the challenge, verbatim.
    Challenge(String),
    AlreadyProcessed,
    Handled,
}

impl Ack {
    pub fn body(&self) -> &str {
        match self {
            Ack::Challenge(c) => c,
            Ack::AlreadyProcessed => ACK_ALREADY_PROCESSED,
            Ack::Handled => ACK_HANDLED,
        }
    }
}

/// A payload that cannot be acted on. Logged and acknowledged, never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("url_verification payload without challenge")]
    MissingChallenge,
    #[error("event_callback payload without event_id")]
    MissingEventId,
    #[error("message event without channel")]
    MissingChannel,
}

/// Routes webhook payloads: Deduplicator → Backend → Channel.
pub struct WebhookDispatcher {
    bot_user_id: String,
    dedup: Arc<EventDeduplicator>,
    backend: Arc<dyn ReplyBackend>,
    channel: Arc<dyn ChannelHandle>,
    fallback_text: String,
}

impl WebhookDispatcher {
    /// `bot_user_id` is the identity the relay posts as; messages from it are never answered.
    pub fn new(
        bot_user_id: impl Into<String>,
        dedup: Arc<EventDeduplicator>,
        backend: Arc<dyn ReplyBackend>,
        channel: Arc<dyn ChannelHandle>,
    ) -> Self {
        Self {
            bot_user_id: bot_user_id.into(),
            dedup,
            backend,
            channel,
            fallback_text: DEFAULT_FALLBACK_TEXT.to_string(),
        }
    }

    pub fn with_fallback_text(mut self, text: impl Into<String>) -> Self {
        self.fallback_text = text.into();
        self
    }

    pub fn fallback_text(&self) -> &str {
        &self.fallback_text
    }

    pub fn bot_user_id(&self) -> &str {
        &self.bot_user_id
    }

    pub fn dedup(&self) -> &EventDeduplicator {
        &self.dedup
    }

    /// Parse a raw JSON body and dispatch it. Unparseable bodies are acknowledged.
    pub async fn dispatch_body(&self, body: &[u8]) -> Ack {
        match InboundPayload::from_slice(body) {
            Ok(payload) => self.dispatch(payload).await,
            Err(e) => {
                log::warn!("webhook: {}", ValidationError::Malformed(e.to_string()));
                Ack::Handled
            }
        }
    }

    pub async fn dispatch(&self, payload: InboundPayload) -> Ack {
        match payload.kind {
            PayloadType::UrlVerification => match payload.challenge {
                Some(challenge) => {
                    log::info!("webhook: answering url_verification handshake");
                    Ack::Challenge(challenge)
                }
                None => {
                    log::warn!("webhook: {}", ValidationError::MissingChallenge);
                    Ack::Handled
                }
            },
            PayloadType::EventCallback => {
                let Some(event_id) = payload.event_id.filter(|id| !id.trim().is_empty()) else {
                    log::warn!("webhook: {}", ValidationError::MissingEventId);
                    return Ack::Handled;
                };
                // Marked before any outbound call: a retry that arrives while this delivery
                // is still waiting on the backend must see the id.
                if !self.dedup.check_and_mark(&event_id) {
                    log::debug!("webhook: event {} already processed", event_id);
                    return Ack::AlreadyProcessed;
                }
                match payload.event {
                    Some(event) => self.handle_event(&event_id, event).await,
                    None => log::debug!("webhook: event {} has no event body", event_id),
                }
                Ack::Handled
            }
            PayloadType::Other => {
                log::debug!("webhook: ignoring payload of unhandled type");
                Ack::Handled
            }
        }
    }

    async fn handle_event(&self, event_id: &str, event: MessageEvent) {
        if !event.is_message() {
            log::debug!(
                "webhook: event {} is {:?}, not a message",
                event_id,
                event.kind.as_deref().unwrap_or("untyped")
            );
            return;
        }
        let Some(text) = event.text else {
            log::debug!("webhook: message event {} has no text", event_id);
            return;
        };
        match event.user_id.as_deref() {
            Some(user) if user == self.bot_user_id => {
                log::debug!("webhook: event {} is the bot's own message", event_id);
                return;
            }
            Some(_) => {}
            None => {
                log::debug!("webhook: message event {} has no sender", event_id);
                return;
            }
        }
        let Some(channel_id) = event.channel_id.as_deref() else {
            log::warn!("webhook: event {}: {}", event_id, ValidationError::MissingChannel);
            return;
        };
        let thread_ts = event.ts.as_deref();

        let reply = match self.backend.request_reply(vec![ChatMessage::user(text)]).await {
            Ok(reply) if !reply.trim().is_empty() => reply,
            Ok(_) | Err(BackendError::EmptyReply) => {
                log::warn!("webhook: event {}: backend returned an empty reply", event_id);
                self.fallback_text.clone()
            }
            Err(e) => {
                log::warn!(
                    "webhook: event {}: backend request failed (retryable: {}): {}",
                    event_id,
                    e.is_retryable(),
                    e
                );
                self.fallback_text.clone()
            }
        };

        if self.channel.send(channel_id, &reply, thread_ts).await {
            log::info!("webhook: event {}: replied in {}", event_id, channel_id);
        } else {
            log::warn!("webhook: event {}: reply to {} was not delivered", event_id, channel_id);
        }
    }
}
