//! Outbound side of a channel: post a reply into a conversation.

use crate::channels::RelayError;
use async_trait::async_trait;

/// Handle to a chat channel the relay can post into.
#[async_trait]
pub trait ChannelHandle: Send + Sync {
    /// Channel id (e.g. "slack").
    fn id(&self) -> &str;

    /// Post `text` into `channel_id`; with `thread_ts`, as a reply in that thread.
    async fn post_message(
        &self,
        channel_id: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<(), RelayError>;

    /// Like [`post_message`](Self::post_message), but failures are logged and reported as
    /// `false` instead of returned. Delivery is the last step of handling an event, so there
    /// is nothing further to fall back to.
    async fn send(&self, channel_id: &str, text: &str, thread_ts: Option<&str>) -> bool {
        match self.post_message(channel_id, text, thread_ts).await {
            Ok(()) => true,
            Err(e) => {
                log::warn!("{}: failed to post message to {}: {}", self.id(), channel_id, e);
                false
            }
        }
    }
}
