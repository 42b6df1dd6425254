//! Gateway HTTP server: the Slack Events webhook plus a health probe, on one port.

use crate::channels::SlackChannel;
use crate::config::{self, Config, Secrets};
use crate::dedup::EventDeduplicator;
use crate::gateway::dispatcher::WebhookDispatcher;
use crate::gateway::signature::{self, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use crate::llm::ChatbaseClient;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

const RETRY_NUM_HEADER: &str = "X-Slack-Retry-Num";
const RETRY_REASON_HEADER: &str = "X-Slack-Retry-Reason";

/// Shared state for the webhook handlers.
#[derive(Clone)]
pub struct GatewayState {
    port: u16,
    events_path: String,
    /// `None` disables signature verification.
    signing_secret: Option<Arc<str>>,
    dispatcher: Arc<WebhookDispatcher>,
}

impl GatewayState {
    /// State without signature verification, serving events at the default path.
    pub fn new(port: u16, dispatcher: Arc<WebhookDispatcher>) -> Self {
        Self {
            port,
            events_path: config::GatewayConfig::default().events_path,
            signing_secret: None,
            dispatcher,
        }
    }

    pub fn with_signing_secret(mut self, secret: impl Into<Arc<str>>) -> Self {
        self.signing_secret = Some(secret.into());
        self
    }

    pub fn with_events_path(mut self, path: &str) -> Self {
        let path = path.trim();
        self.events_path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        self
    }

    pub fn events_path(&self) -> &str {
        &self.events_path
    }

    pub fn dispatcher(&self) -> &Arc<WebhookDispatcher> {
        &self.dispatcher
    }
}

/// Routes: `POST {events_path}` (Slack events) and `GET /` (health).
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route(&state.events_path.clone(), post(slack_events))
        .with_state(state)
}

/// Wire the dispatcher and its collaborators from config and resolved secrets.
/// Looks up the bot's user id with auth.test when none is configured; failure is fatal.
pub async fn build_state(config: &Config, secrets: Secrets) -> Result<GatewayState> {
    let slack = SlackChannel::new(
        secrets.slack.bot_token,
        config.slack.api_base.clone(),
        config.slack.timeout(),
    )
    .context("building slack client")?;

    let bot_user_id = match secrets.slack.bot_user_id {
        Some(id) => id,
        None => {
            let id = slack
                .auth_test()
                .await
                .context("resolving bot user id with auth.test (set slack.botUserId or SLACK_BOT_USER_ID to skip)")?;
            log::info!("slack: bot user id is {}", id);
            id
        }
    };

    let backend = ChatbaseClient::new(
        secrets.backend.secret,
        secrets.backend.chat_id,
        config.backend.api_url.clone(),
        config.backend.timeout(),
    )
    .context("building chatbase client")?;

    let dedup = config
        .dedup
        .capacity
        .map(EventDeduplicator::with_capacity)
        .unwrap_or_default();

    let mut dispatcher =
        WebhookDispatcher::new(bot_user_id, Arc::new(dedup), Arc::new(backend), Arc::new(slack));
    if let Some(text) = config
        .slack
        .fallback_text
        .as_deref()
        .filter(|t| !t.trim().is_empty())
    {
        dispatcher = dispatcher.with_fallback_text(text);
    }

    let mut state = GatewayState::new(config.gateway.port, Arc::new(dispatcher))
        .with_events_path(&config.gateway.events_path);
    if config.slack.verify_signatures {
        state = state.with_signing_secret(secrets.slack.signing_secret);
    } else {
        log::warn!("slack request signature verification is disabled");
    }
    Ok(state)
}

/// Serve `state` on an already-bound listener until Ctrl+C or SIGTERM.
pub async fn serve(listener: tokio::net::TcpListener, mut state: GatewayState) -> Result<()> {
    let addr = listener.local_addr().context("reading listener address")?;
    state.port = addr.port();
    log::info!(
        "gateway listening on {} (events at {})",
        addr,
        state.events_path
    );
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Resolve secrets, wire the relay, and serve until shutdown.
pub async fn run_gateway(config: Config) -> Result<()> {
    let secrets = config::resolve_secrets(&config).context("resolving credentials")?;
    log::debug!("resolved credentials: {:?}", secrets);
    let state = build_state(&config, secrets).await?;

    let bind_addr = format!("{}:{}", config.gateway.bind.trim(), config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    serve(listener, state).await
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
/// In-flight requests are drained by axum before `serve` returns.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining in-flight requests");
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// POST {events_path}: verify the signature, then hand the body to the dispatcher.
/// Always 200 once verified, so Slack stops retrying.
async fn slack_events(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    if let Some(secret) = state.signing_secret.as_deref() {
        if let Err(e) = signature::verify(
            secret,
            header_str(&headers, TIMESTAMP_HEADER),
            header_str(&headers, SIGNATURE_HEADER),
            &body,
            unix_now(),
        ) {
            log::warn!("webhook: rejected request: {}", e);
            return (StatusCode::UNAUTHORIZED, "invalid request signature".to_string());
        }
    }
    if let Some(retry) = header_str(&headers, RETRY_NUM_HEADER) {
        log::debug!(
            "webhook: slack retry #{} ({})",
            retry,
            header_str(&headers, RETRY_REASON_HEADER).unwrap_or("no reason given")
        );
    }
    let ack = state.dispatcher.dispatch_body(&body).await;
    (StatusCode::OK, ack.body().to_string())
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.port,
        "processedEvents": state.dispatcher.dedup().len(),
    }))
}
