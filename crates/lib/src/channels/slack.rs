//! Slack channel: Web API calls for posting replies (chat.postMessage) and resolving the
//! bot's own user id (auth.test).

use crate::channels::handle::ChannelHandle;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const SLACK_API_BASE: &str = "https://slack.com/api";

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("slack request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("slack http error: {status} {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    /// The Web API answered `ok: false`.
    #[error("slack api error: {0}")]
    Api(String),
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct PostMessageRequest<'a> {
    channel: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    thread_ts: Option<&'a str>,
}

/// Slack connector authenticated with a bot token.
pub struct SlackChannel {
    id: String,
    token: String,
    api_base: String,
    client: reqwest::Client,
}

impl SlackChannel {
    /// `api_base` defaults to [`SLACK_API_BASE`]; `timeout` bounds each Web API call.
    pub fn new(
        token: impl Into<String>,
        api_base: Option<String>,
        timeout: Duration,
    ) -> Result<Self, RelayError> {
        let api_base = api_base
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| SLACK_API_BASE.to_string());
        Ok(Self {
            id: "slack".to_string(),
            token: token.into(),
            api_base,
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    async fn call<T: Serialize + ?Sized>(
        &self,
        method: &str,
        body: &T,
    ) -> Result<ApiResponse, RelayError> {
        let url = format!("{}/{}", self.api_base, method);
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(RelayError::Status { status, body });
        }
        let data: ApiResponse = res.json().await?;
        if !data.ok {
            return Err(RelayError::Api(
                data.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        Ok(data)
    }

    /// auth.test: the user id the bot token posts as.
    pub async fn auth_test(&self) -> Result<String, RelayError> {
        let data = self.call("auth.test", &serde_json::json!({})).await?;
        data.user_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| RelayError::Api("auth.test returned no user_id".to_string()))
    }

    /// chat.postMessage, threaded under `thread_ts` when given.
    pub async fn post_message(
        &self,
        channel_id: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<(), RelayError> {
        let body = PostMessageRequest {
            channel: channel_id,
            text,
            thread_ts,
        };
        self.call("chat.postMessage", &body).await?;
        log::debug!("slack: posted reply to {} (thread {:?})", channel_id, thread_ts);
        Ok(())
    }
}

#[async_trait]
impl ChannelHandle for SlackChannel {
    fn id(&self) -> &str {
        &self.id
    }

    async fn post_message(
        &self,
        channel_id: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<(), RelayError> {
        SlackChannel::post_message(self, channel_id, text, thread_ts).await
    }
}
