//! Conversational backend: reply types and the Chatbase client.
//!
//! The webhook path uses the streamed reply (raw text chunks joined into one string);
//! a non-streaming JSON variant is kept for one-shot use from the CLI.

mod backend;
mod chatbase;
mod stream;

pub use backend::{BackendError, ChatMessage, ReplyBackend, Role};
pub use chatbase::{ChatbaseClient, ChatbaseReply, DEFAULT_API_URL};
pub use stream::ReplyStream;
