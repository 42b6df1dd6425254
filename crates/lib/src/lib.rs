//! chatrelay core library: Slack webhook intake, event dedup, the Chatbase backend, and
//! the gateway that ties them together. Used by the `chatrelay` CLI.

pub mod channels;
pub mod config;
pub mod dedup;
pub mod gateway;
pub mod init;
pub mod llm;
