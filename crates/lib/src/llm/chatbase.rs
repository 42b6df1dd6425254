//! Chatbase chat API client (https://www.chatbase.co/api/v1/chat).
//! Supports the streamed reply (raw text chunks) and the non-streaming JSON reply.

use crate::llm::{BackendError, ChatMessage, ReplyBackend, ReplyStream};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://www.chatbase.co/api/v1/chat";

/// Sampling temperature for the streamed reply used by the webhook path.
const STREAM_TEMPERATURE: f64 = 0.0;
/// Sampling temperature for the non-streaming variant.
const NON_STREAM_TEMPERATURE: f64 = 0.7;

/// Client for one Chatbase chatbot.
#[derive(Clone)]
pub struct ChatbaseClient {
    api_url: String,
    secret: String,
    chat_id: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest<'a> {
    messages: &'a [ChatMessage],
    chat_id: &'a str,
    stream: bool,
    temperature: f64,
}

/// Body of a non-streaming reply.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatbaseReply {
    #[serde(default)]
    pub text: String,
}

impl ChatbaseClient {
    /// `api_url` defaults to [`DEFAULT_API_URL`]; `timeout` bounds the whole request, body included.
    pub fn new(
        secret: impl Into<String>,
        chat_id: impl Into<String>,
        api_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let api_url = api_url
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            api_url,
            secret: secret.into(),
            chat_id: chat_id.into(),
            client,
        })
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    async fn post(
        &self,
        messages: &[ChatMessage],
        stream: bool,
        temperature: f64,
    ) -> Result<reqwest::Response, BackendError> {
        let body = ChatRequest {
            messages,
            chat_id: &self.chat_id,
            stream,
            temperature,
        };
        let res = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.secret)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(BackendError::Status { status, body });
        }
        Ok(res)
    }

    /// POST with stream: true, temperature 0. Fragments are yielded as they arrive.
    pub async fn reply_stream(&self, messages: &[ChatMessage]) -> Result<ReplyStream, BackendError> {
        let res = self.post(messages, true, STREAM_TEMPERATURE).await?;
        Ok(ReplyStream::from_response(res))
    }

    /// Streamed request joined into one string. Whitespace-only text is `EmptyReply`.
    pub async fn request_reply(&self, messages: &[ChatMessage]) -> Result<String, BackendError> {
        let text = self.reply_stream(messages).await?.into_text().await?;
        if text.trim().is_empty() {
            return Err(BackendError::EmptyReply);
        }
        Ok(text)
    }

    /// POST with stream: false, temperature 0.7; returns the decoded JSON reply.
    pub async fn send_message(&self, messages: &[ChatMessage]) -> Result<ChatbaseReply, BackendError> {
        let res = self.post(messages, false, NON_STREAM_TEMPERATURE).await?;
        Ok(res.json().await?)
    }
}

#[async_trait]
impl ReplyBackend for ChatbaseClient {
    async fn request_reply(&self, messages: Vec<ChatMessage>) -> Result<String, BackendError> {
        ChatbaseClient::request_reply(self, &messages).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ChatbaseClient {
        ChatbaseClient::new(
            "cb_secret",
            "bot-123",
            Some(format!("{}/api/v1/chat", server.uri())),
            Duration::from_secs(5),
        )
        .expect("build client")
    }

    #[test]
    fn default_api_url_when_unset_or_blank() {
        let c = ChatbaseClient::new("s", "id", None, Duration::from_secs(1)).expect("client");
        assert_eq!(c.api_url, DEFAULT_API_URL);
        let c = ChatbaseClient::new("s", "id", Some("".into()), Duration::from_secs(1))
            .expect("client");
        assert_eq!(c.api_url, DEFAULT_API_URL);
        let c = ChatbaseClient::new("s", "id", Some("http://x/chat/".into()), Duration::from_secs(1))
            .expect("client");
        assert_eq!(c.api_url, "http://x/chat");
    }

    #[tokio::test]
    async fn streamed_reply_sends_fixed_parameters() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/chat"))
            .and(header("Authorization", "Bearer cb_secret"))
            .and(body_json(json!({
                "messages": [{ "content": "What are your hours?", "role": "user" }],
                "chatId": "bot-123",
                "stream": true,
                "temperature": 0.0
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string("We are open 9 to 5."))
            .expect(1)
            .mount(&server)
            .await;

        let reply = client(&server)
            .request_reply(&[ChatMessage::user("What are your hours?")])
            .await
            .expect("reply");
        assert_eq!(reply, "We are open 9 to 5.");
    }

    #[tokio::test]
    async fn empty_body_is_empty_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("  \n"))
            .mount(&server)
            .await;

        let err = client(&server)
            .request_reply(&[ChatMessage::user("hi")])
            .await
            .expect_err("empty");
        assert!(matches!(err, BackendError::EmptyReply));
    }

    #[tokio::test]
    async fn error_status_is_reported_with_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = client(&server)
            .request_reply(&[ChatMessage::user("hi")])
            .await
            .expect_err("status");
        match &err {
            BackendError::Status { status, body } => {
                assert_eq!(status.as_u16(), 503);
                assert_eq!(body, "overloaded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn slow_backend_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("late")
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let c = ChatbaseClient::new(
            "cb_secret",
            "bot-123",
            Some(server.uri()),
            Duration::from_millis(50),
        )
        .expect("client");
        let err = c
            .request_reply(&[ChatMessage::user("hi")])
            .await
            .expect_err("timeout");
        assert!(matches!(err, BackendError::Timeout));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn connection_refused_is_request_error() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
            listener.local_addr().expect("addr").port()
        };
        let c = ChatbaseClient::new(
            "s",
            "id",
            Some(format!("http://127.0.0.1:{}/chat", port)),
            Duration::from_secs(2),
        )
        .expect("client");
        let err = c
            .request_reply(&[ChatMessage::user("hi")])
            .await
            .expect_err("refused");
        assert!(matches!(err, BackendError::Request(_)));
    }

    #[tokio::test]
    async fn non_streaming_variant_uses_its_own_temperature() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_json(json!({
                "messages": [{ "content": "ping", "role": "user" }],
                "chatId": "bot-123",
                "stream": false,
                "temperature": 0.7
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "text": "pong" })))
            .expect(1)
            .mount(&server)
            .await;

        let reply = client(&server)
            .send_message(&[ChatMessage::user("ping")])
            .await
            .expect("reply");
        assert_eq!(reply.text, "pong");
    }

    #[tokio::test]
    async fn reply_stream_yields_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("streamed text"))
            .mount(&server)
            .await;

        let mut stream = client(&server)
            .reply_stream(&[ChatMessage::user("hi")])
            .await
            .expect("stream");
        let mut text = String::new();
        while let Some(fragment) = stream.next_fragment().await {
            text.push_str(&fragment.expect("fragment"));
        }
        assert_eq!(text, "streamed text");
    }
}
