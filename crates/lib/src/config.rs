//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.chatrelay/config.json`) and environment.
//! Secrets may live in either; the environment wins.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_CONFIG_PATH: &str = "CHATRELAY_CONFIG_PATH";
pub const ENV_SIGNING_SECRET: &str = "SLACK_SIGNING_SECRET";
pub const ENV_SLACK_TOKEN: &str = "SLACK_TOKEN";
pub const ENV_BOT_USER_ID: &str = "SLACK_BOT_USER_ID";
pub const ENV_CHATBASE_SECRET: &str = "CHATBASE_SECRET";
pub const ENV_CHATBOT_ID: &str = "CHATBOT_ID";

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Webhook server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Slack credentials and Web API settings.
    #[serde(default)]
    pub slack: SlackConfig,

    /// Chatbase credentials and endpoint.
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub dedup: DedupConfig,
}

/// Webhook server bind, port, and route.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for the webhook listener (default 8080).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "0.0.0.0"; Slack must be able to reach it).
    #[serde(default = "default_gateway_bind")]
    pub bind: String,

    /// Route Slack posts events to (default "/slack/events").
    #[serde(default = "default_events_path")]
    pub events_path: String,
}

fn default_gateway_port() -> u16 {
    8080
}

fn default_gateway_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_events_path() -> String {
    "/slack/events".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
            events_path: default_events_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlackConfig {
    /// Bot token (xoxb-...). Overridden by SLACK_TOKEN env.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,

    /// Signing secret for request verification. Overridden by SLACK_SIGNING_SECRET env.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_secret: Option<String>,

    /// The bot's own user id. When unset (and SLACK_BOT_USER_ID is unset) it is looked up
    /// with auth.test at startup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_user_id: Option<String>,

    /// Reject requests whose X-Slack-Signature does not verify (default true).
    #[serde(default = "default_true")]
    pub verify_signatures: bool,

    /// Web API base URL; defaults to https://slack.com/api.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,

    #[serde(default = "default_slack_timeout_secs")]
    pub timeout_secs: u64,

    /// Posted in-thread when the backend fails or returns nothing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_text: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_slack_timeout_secs() -> u64 {
    10
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            signing_secret: None,
            bot_user_id: None,
            verify_signatures: true,
            api_base: None,
            timeout_secs: default_slack_timeout_secs(),
            fallback_text: None,
        }
    }
}

impl SlackConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    /// Chatbase API key. Overridden by CHATBASE_SECRET env.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,

    /// Chatbot id. Overridden by CHATBOT_ID env.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,

    /// Chat endpoint; defaults to https://www.chatbase.co/api/v1/chat.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Bound on one backend request, including reading the streamed body.
    #[serde(default = "default_backend_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_backend_timeout_secs() -> u64 {
    30
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            secret: None,
            chat_id: None,
            api_url: None,
            timeout_secs: default_backend_timeout_secs(),
        }
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Processed-event memory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DedupConfig {
    /// Maximum remembered event ids; oldest are forgotten first. Unset or 0 remembers
    /// every id for the life of the process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required settings: {}", .0.join(", "))]
    Missing(Vec<String>),
}

/// Slack credentials after env/config resolution.
#[derive(Clone)]
pub struct SlackCredentials {
    pub bot_token: String,
    pub signing_secret: String,
    pub bot_user_id: Option<String>,
}

/// Chatbase credentials after env/config resolution.
#[derive(Clone)]
pub struct BackendCredentials {
    pub secret: String,
    pub chat_id: String,
}

#[derive(Clone)]
pub struct Secrets {
    pub slack: SlackCredentials,
    pub backend: BackendCredentials,
}

impl fmt::Debug for SlackCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlackCredentials")
            .field("bot_token", &"<redacted>")
            .field("signing_secret", &"<redacted>")
            .field("bot_user_id", &self.bot_user_id)
            .finish()
    }
}

impl fmt::Debug for BackendCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendCredentials")
            .field("secret", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("slack", &self.slack)
            .field("backend", &self.backend)
            .finish()
    }
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|t| !t.is_empty()).map(str::to_string)
}

/// Env (via `env`) overrides the config value; blank values count as unset.
fn pick(
    env: &impl Fn(&str) -> Option<String>,
    var: &str,
    from_config: Option<&String>,
) -> Option<String> {
    non_empty(env(var).as_deref()).or_else(|| non_empty(from_config.map(String::as_str)))
}

fn require(
    value: Option<String>,
    key: &str,
    var: &str,
    missing: &mut Vec<String>,
) -> String {
    value.unwrap_or_else(|| {
        missing.push(format!("{} ({})", key, var));
        String::new()
    })
}

fn process_env(var: &str) -> Option<String> {
    std::env::var(var).ok()
}

/// Resolve the backend credentials from the process environment and config.
pub fn resolve_backend_credentials(config: &Config) -> Result<BackendCredentials, ConfigError> {
    resolve_backend_credentials_with(config, process_env)
}

pub fn resolve_backend_credentials_with(
    config: &Config,
    env: impl Fn(&str) -> Option<String>,
) -> Result<BackendCredentials, ConfigError> {
    let mut missing = Vec::new();
    let creds = backend_credentials(config, &env, &mut missing);
    if missing.is_empty() {
        Ok(creds)
    } else {
        Err(ConfigError::Missing(missing))
    }
}

fn backend_credentials(
    config: &Config,
    env: &impl Fn(&str) -> Option<String>,
    missing: &mut Vec<String>,
) -> BackendCredentials {
    BackendCredentials {
        secret: require(
            pick(env, ENV_CHATBASE_SECRET, config.backend.secret.as_ref()),
            "backend.secret",
            ENV_CHATBASE_SECRET,
            missing,
        ),
        chat_id: require(
            pick(env, ENV_CHATBOT_ID, config.backend.chat_id.as_ref()),
            "backend.chatId",
            ENV_CHATBOT_ID,
            missing,
        ),
    }
}

/// Resolve every secret the gateway needs from the process environment and config.
pub fn resolve_secrets(config: &Config) -> Result<Secrets, ConfigError> {
    resolve_secrets_with(config, process_env)
}

/// Like [`resolve_secrets`], reading variables through `env`. Reports all missing
/// settings at once.
pub fn resolve_secrets_with(
    config: &Config,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Secrets, ConfigError> {
    let mut missing = Vec::new();
    let slack = SlackCredentials {
        bot_token: require(
            pick(&env, ENV_SLACK_TOKEN, config.slack.bot_token.as_ref()),
            "slack.botToken",
            ENV_SLACK_TOKEN,
            &mut missing,
        ),
        signing_secret: require(
            pick(&env, ENV_SIGNING_SECRET, config.slack.signing_secret.as_ref()),
            "slack.signingSecret",
            ENV_SIGNING_SECRET,
            &mut missing,
        ),
        bot_user_id: pick(&env, ENV_BOT_USER_ID, config.slack.bot_user_id.as_ref()),
    };
    let backend = backend_credentials(config, &env, &mut missing);
    if !missing.is_empty() {
        return Err(ConfigError::Missing(missing));
    }
    Ok(Secrets { slack, backend })
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var(ENV_CONFIG_PATH).map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".chatrelay").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the given path, or the default path (or CHATRELAY_CONFIG_PATH).
/// Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    fn full_config() -> Config {
        serde_json::from_str(
            r#"{
                "slack": { "botToken": "xoxb-cfg", "signingSecret": "sig-cfg" },
                "backend": { "secret": "cb-cfg", "chatId": "bot-cfg" }
            }"#,
        )
        .expect("parse")
    }

    #[test]
    fn defaults() {
        let config: Config = serde_json::from_str("{}").expect("parse");
        assert_eq!(config.gateway.port, 8080);
        assert_eq!(config.gateway.bind, "0.0.0.0");
        assert_eq!(config.gateway.events_path, "/slack/events");
        assert!(config.slack.verify_signatures);
        assert_eq!(config.slack.timeout(), Duration::from_secs(10));
        assert_eq!(config.backend.timeout(), Duration::from_secs(30));
        assert_eq!(config.dedup.capacity, None);
    }

    #[test]
    fn camel_case_keys() {
        let config: Config = serde_json::from_str(
            r#"{
                "gateway": { "port": 3000, "eventsPath": "/events" },
                "slack": { "botUserId": "UBOT", "verifySignatures": false, "timeoutSecs": 3 },
                "backend": { "apiUrl": "http://localhost:9/chat" },
                "dedup": { "capacity": 5 }
            }"#,
        )
        .expect("parse");
        assert_eq!(config.gateway.port, 3000);
        assert_eq!(config.gateway.bind, "0.0.0.0");
        assert_eq!(config.gateway.events_path, "/events");
        assert_eq!(config.slack.bot_user_id.as_deref(), Some("UBOT"));
        assert!(!config.slack.verify_signatures);
        assert_eq!(config.slack.timeout_secs, 3);
        assert_eq!(config.backend.api_url.as_deref(), Some("http://localhost:9/chat"));
        assert_eq!(config.dedup.capacity, Some(5));
    }

    #[test]
    fn secrets_from_config() {
        let secrets = resolve_secrets_with(&full_config(), env_of(&[])).expect("resolve");
        assert_eq!(secrets.slack.bot_token, "xoxb-cfg");
        assert_eq!(secrets.slack.signing_secret, "sig-cfg");
        assert_eq!(secrets.slack.bot_user_id, None);
        assert_eq!(secrets.backend.secret, "cb-cfg");
        assert_eq!(secrets.backend.chat_id, "bot-cfg");
    }

    #[test]
    fn env_overrides_config() {
        let env = env_of(&[
            (ENV_SLACK_TOKEN, "xoxb-env"),
            (ENV_CHATBOT_ID, "bot-env"),
            (ENV_BOT_USER_ID, "UENV"),
            (ENV_SIGNING_SECRET, "   "),
        ]);
        let secrets = resolve_secrets_with(&full_config(), env).expect("resolve");
        assert_eq!(secrets.slack.bot_token, "xoxb-env");
        assert_eq!(secrets.backend.chat_id, "bot-env");
        assert_eq!(secrets.slack.bot_user_id.as_deref(), Some("UENV"));
        // blank env values do not shadow config
        assert_eq!(secrets.slack.signing_secret, "sig-cfg");
    }

    #[test]
    fn missing_secrets_are_all_reported() {
        let err = resolve_secrets_with(&Config::default(), env_of(&[(ENV_SLACK_TOKEN, "x")]))
            .expect_err("missing");
        let ConfigError::Missing(names) = &err;
        assert_eq!(
            names,
            &vec![
                "slack.signingSecret (SLACK_SIGNING_SECRET)".to_string(),
                "backend.secret (CHATBASE_SECRET)".to_string(),
                "backend.chatId (CHATBOT_ID)".to_string(),
            ]
        );
        assert!(err.to_string().starts_with("missing required settings: "));
    }

    #[test]
    fn backend_credentials_alone() {
        let env = env_of(&[(ENV_CHATBASE_SECRET, "k"), (ENV_CHATBOT_ID, "b")]);
        let creds = resolve_backend_credentials_with(&Config::default(), env).expect("resolve");
        assert_eq!(creds.secret, "k");
        assert_eq!(creds.chat_id, "b");
        assert!(resolve_backend_credentials_with(&Config::default(), env_of(&[])).is_err());
    }

    #[test]
    fn debug_redacts_secrets() {
        let secrets = resolve_secrets_with(&full_config(), env_of(&[])).expect("resolve");
        let shown = format!("{:?}", secrets);
        assert!(!shown.contains("xoxb-cfg"));
        assert!(!shown.contains("sig-cfg"));
        assert!(!shown.contains("cb-cfg"));
        assert!(shown.contains("bot-cfg"));
    }

    #[test]
    fn load_missing_file_gives_defaults() {
        let path = std::env::temp_dir()
            .join(format!("chatrelay-missing-{}", std::process::id()))
            .join("config.json");
        let (config, used) = load_config(Some(path.clone())).expect("load");
        assert_eq!(used, path);
        assert_eq!(config.gateway.port, 8080);
    }
}
