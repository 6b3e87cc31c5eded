//! Configuration management
//!
//! Settings are resolved in this order (later wins):
//! 1. Defaults
//! 2. `azchat.toml` config file (if present)
//! 3. Environment variables
//!
//! Inside the config file, `${VAR_NAME}` is replaced with the value of the
//! environment variable of the same name.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::poll::PollPolicy;
use crate::Error;

/// Default config file looked up by [`Config::load`]
pub const DEFAULT_CONFIG_FILE: &str = "azchat.toml";

/// LLM Provider type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Azure OpenAI (deployment-scoped URLs, `api-key` header)
    #[default]
    Azure,
    /// OpenAI or an OpenAI-compatible API (bearer auth)
    OpenAi,
}

impl LlmProvider {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "azure" | "azure_openai" => Some(LlmProvider::Azure),
            "openai" | "open_ai" | "compatible" => Some(LlmProvider::OpenAi),
            _ => None,
        }
    }
}

/// Which remote API backs a conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    /// History kept in the session and resent on every chat-completions call
    #[default]
    Completions,
    /// History kept in a remote thread, replies produced by assistant runs
    Assistant,
}

impl ChatMode {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "completions" | "completion" | "stateless" => Some(ChatMode::Completions),
            "assistant" | "assistants" | "thread" | "stateful" => Some(ChatMode::Assistant),
            _ => None,
        }
    }
}

/// Upper bound for `RUN_POLL_BACKOFF`
pub const MAX_POLL_BACKOFF: f64 = 10.0;

/// Upper bound for `SESSION_LIFETIME_HOURS` (ten years)
pub const MAX_SESSION_LIFETIME_HOURS: u64 = 24 * 365 * 10;

/// Parse an environment value, naming the variable when it is malformed.
fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> crate::Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("Invalid value for {}: {:?}", key, value)))
}

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// API key
    #[serde(default, skip_serializing)]
    pub api_key: String,

    /// Azure resource endpoint, e.g. `https://my-resource.openai.azure.com`
    pub endpoint: Option<String>,

    /// Azure API version (query parameter)
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Deployment (Azure) or model (OpenAI) used for chat completions
    pub deployment: Option<String>,

    /// Assistant used for thread runs
    pub assistant_id: Option<String>,

    /// API provider
    #[serde(default)]
    pub provider: LlmProvider,

    /// Base URL override (optional, for custom endpoints and tests)
    pub base_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: None,
            api_version: default_api_version(),
            deployment: None,
            assistant_id: None,
            provider: LlmProvider::Azure,
            base_url: None,
        }
    }
}

/// Conversation behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default)]
    pub mode: ChatMode,

    /// Instruction prepended to an empty history in completions mode
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Delay between run status polls
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Multiplier applied to the poll delay after each poll (1.0 = fixed)
    #[serde(default = "default_poll_backoff")]
    pub poll_backoff: f64,

    /// Budget for a single run before it is reported as `timeout`
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            mode: ChatMode::Completions,
            system_prompt: default_system_prompt(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_backoff: default_poll_backoff(),
            run_timeout_secs: default_run_timeout_secs(),
        }
    }
}

/// Browser session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Secret used to sign the session cookie
    #[serde(skip_serializing)]
    pub secret: Option<String>,

    /// Session lifetime in hours (refreshed on every request)
    #[serde(default = "default_session_lifetime_hours")]
    pub lifetime_hours: u64,

    /// Path to an SQLite file; sessions stay in memory when unset
    pub db_path: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: None,
            lifetime_hours: default_session_lifetime_hours(),
            db_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Main configuration for azchat
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub chat: ChatConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

fn default_api_version() -> String {
    "2024-05-01-preview".to_string()
}

fn default_system_prompt() -> String {
    "You are a helpful, conversational assistant. You can talk about any topic \
     using general knowledge."
        .to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_poll_backoff() -> f64 {
    1.0
}

fn default_run_timeout_secs() -> u64 {
    60
}

fn default_session_lifetime_hours() -> u64 {
    24 * 7
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

impl Config {
    /// Expand `${VAR_NAME}` references using `lookup`.
    ///
    /// Unknown variables expand to an empty string.
    fn expand_env_vars(value: &str, lookup: &impl Fn(&str) -> Option<String>) -> String {
        let mut result = String::new();
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '$' && chars.peek() == Some(&'{') {
                chars.next();

                let mut var_name = String::new();
                for c in chars.by_ref() {
                    if c == '}' {
                        break;
                    }
                    var_name.push(c);
                }

                if let Some(env_value) = lookup(&var_name) {
                    result.push_str(&env_value);
                }
            } else {
                result.push(c);
            }
        }

        result
    }

    /// Load configuration from a TOML file, then apply environment overrides.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();

        let toml_content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&toml_content, |key| std::env::var(key).ok())
    }

    /// Parse TOML text with `${VAR}` expansion and overrides taken from `lookup`.
    pub fn from_toml_str(
        content: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> crate::Result<Self> {
        let expanded = Self::expand_env_vars(content, &lookup);

        let mut cfg: Config = toml::from_str(&expanded)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;

        cfg.apply_overrides(&lookup)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from `./azchat.toml` when it exists, otherwise from the
    /// environment alone.
    pub fn load() -> crate::Result<Self> {
        if Path::new(DEFAULT_CONFIG_FILE).exists() {
            return Self::from_toml_file(DEFAULT_CONFIG_FILE);
        }

        Self::from_env()
    }

    /// Load configuration from environment variables
    pub fn from_env() -> crate::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from defaults plus whatever `lookup` resolves.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> crate::Result<Self> {
        let mut cfg = Config::default();
        cfg.apply_overrides(&lookup)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Overwrite settings with non-empty values from `lookup`.
    ///
    /// A value that does not parse is a configuration error.
    fn apply_overrides(&mut self, lookup: &impl Fn(&str) -> Option<String>) -> crate::Result<()> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        // LLM
        if let Some(api_key) = get("AZURE_OPENAI_API_KEY").or_else(|| get("LLM_API_KEY")) {
            self.llm.api_key = api_key;
        }
        if let Some(endpoint) = get("AZURE_OPENAI_ENDPOINT") {
            self.llm.endpoint = Some(endpoint);
        }
        if let Some(version) = get("AZURE_OPENAI_API_VERSION") {
            self.llm.api_version = version;
        }
        if let Some(deployment) = get("AZURE_OPENAI_DEPLOYMENT_NAME").or_else(|| get("LLM_MODEL")) {
            self.llm.deployment = Some(deployment);
        }
        if let Some(assistant) = get("AZURE_OPENAI_ASSISTANT_ID") {
            self.llm.assistant_id = Some(assistant);
        }
        if let Some(provider) = get("LLM_PROVIDER") {
            self.llm.provider = LlmProvider::parse(&provider).ok_or_else(|| {
                Error::Config(format!(
                    "Invalid value for LLM_PROVIDER: {:?} (expected azure or openai)",
                    provider
                ))
            })?;
        }
        if let Some(base_url) = get("LLM_BASE_URL") {
            self.llm.base_url = Some(base_url);
        }

        // Chat
        if let Some(mode) = get("CHAT_MODE") {
            self.chat.mode = ChatMode::parse(&mode).ok_or_else(|| {
                Error::Config(format!(
                    "Invalid value for CHAT_MODE: {:?} (expected completions or assistant)",
                    mode
                ))
            })?;
        }
        if let Some(prompt) = get("SYSTEM_PROMPT") {
            self.chat.system_prompt = prompt;
        }
        if let Some(ms) = get("RUN_POLL_INTERVAL_MS") {
            self.chat.poll_interval_ms = parse_var("RUN_POLL_INTERVAL_MS", &ms)?;
        }
        if let Some(factor) = get("RUN_POLL_BACKOFF") {
            self.chat.poll_backoff = parse_var("RUN_POLL_BACKOFF", &factor)?;
        }
        if let Some(secs) = get("RUN_TIMEOUT_SECS") {
            self.chat.run_timeout_secs = parse_var("RUN_TIMEOUT_SECS", &secs)?;
        }

        // Session
        if let Some(secret) = get("SESSION_SECRET") {
            self.session.secret = Some(secret);
        }
        if let Some(hours) = get("SESSION_LIFETIME_HOURS") {
            self.session.lifetime_hours = parse_var("SESSION_LIFETIME_HOURS", &hours)?;
        }
        if let Some(path) = get("SESSION_DB_PATH") {
            self.session.db_path = Some(path);
        }

        // Server
        if let Some(host) = get("HOST") {
            self.server.host = host;
        }
        if let Some(port) = get("PORT") {
            self.server.port = parse_var("PORT", &port)?;
        }

        Ok(())
    }

    /// Fail when a variable required by the selected provider/mode is missing.
    pub fn validate(&self) -> crate::Result<()> {
        let mut missing = Vec::new();

        if self.llm.api_key.trim().is_empty() {
            missing.push("AZURE_OPENAI_API_KEY");
        }
        if self.llm.provider == LlmProvider::Azure
            && self.llm.base_url.is_none()
            && self.llm.endpoint.as_deref().is_none_or(|e| e.trim().is_empty())
        {
            missing.push("AZURE_OPENAI_ENDPOINT");
        }
        match self.chat.mode {
            ChatMode::Completions if self.llm.deployment.is_none() => {
                missing.push("AZURE_OPENAI_DEPLOYMENT_NAME");
            }
            ChatMode::Assistant if self.llm.assistant_id.is_none() => {
                missing.push("AZURE_OPENAI_ASSISTANT_ID");
            }
            _ => {}
        }

        if !missing.is_empty() {
            return Err(Error::Config(format!(
                "Missing required variables: {}",
                missing.join(", ")
            )));
        }

        let backoff = self.chat.poll_backoff;
        if !backoff.is_finite() || !(1.0..=MAX_POLL_BACKOFF).contains(&backoff) {
            return Err(Error::Config(format!(
                "RUN_POLL_BACKOFF must be between 1.0 and {}, got {}",
                MAX_POLL_BACKOFF, backoff
            )));
        }
        if self.chat.poll_interval_ms == 0 {
            return Err(Error::Config(
                "RUN_POLL_INTERVAL_MS must be greater than 0".to_string(),
            ));
        }
        if self.chat.run_timeout_secs == 0 {
            return Err(Error::Config(
                "RUN_TIMEOUT_SECS must be greater than 0".to_string(),
            ));
        }
        if !(1..=MAX_SESSION_LIFETIME_HOURS).contains(&self.session.lifetime_hours) {
            return Err(Error::Config(format!(
                "SESSION_LIFETIME_HOURS must be between 1 and {}",
                MAX_SESSION_LIFETIME_HOURS
            )));
        }

        Ok(())
    }

    /// Session lifetime as a chrono duration, capped at
    /// [`MAX_SESSION_LIFETIME_HOURS`]
    pub fn session_lifetime(&self) -> chrono::Duration {
        let hours = self.session.lifetime_hours.min(MAX_SESSION_LIFETIME_HOURS);
        chrono::Duration::hours(hours as i64)
    }

    /// Polling policy for assistant runs
    pub fn poll_policy(&self) -> PollPolicy {
        let interval = Duration::from_millis(self.chat.poll_interval_ms);
        PollPolicy {
            interval,
            backoff: self.chat.poll_backoff,
            max_interval: interval.max(Duration::from_secs(5)),
            timeout: Duration::from_secs(self.chat.run_timeout_secs),
        }
    }

    /// `host:port` the HTTP server binds to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
