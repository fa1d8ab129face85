use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dialogue::intent::{Intent, RolePolicy};
use crate::domain::daily_update::UpdatePolicy;
use crate::domain::user::Role;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub dialogue: DialogueConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Debug)]
pub struct DialogueConfig {
    /// Number of prior chat messages fed to the memory summarizer.
    pub history_window: u32,
    pub update_policy: UpdatePolicy,
    /// Domain used when deriving `first.last@domain` addresses for new users.
    pub email_domain: String,
    /// Offset of the organisation's local calendar from UTC, used for "today".
    pub utc_offset_minutes: i32,
    pub turn_timeout_secs: u64,
    pub role_policy: RolePolicy,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub server_port: Option<u16>,
    pub update_policy: Option<UpdatePolicy>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://risepal.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 30,
                max_retries: 2,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
            dialogue: DialogueConfig {
                history_window: 5,
                update_policy: UpdatePolicy::AllowMultiple,
                email_domain: "risetechvillage.com".to_string(),
                utc_offset_minutes: 0,
                turn_timeout_secs: 90,
                role_policy: RolePolicy::default(),
            },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
        }
    }
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama",
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("risepal.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        if let Some(dialogue) = patch.dialogue {
            if let Some(history_window) = dialogue.history_window {
                self.dialogue.history_window = history_window;
            }
            if let Some(update_policy) = dialogue.update_policy {
                self.dialogue.update_policy = update_policy;
            }
            if let Some(email_domain) = dialogue.email_domain {
                self.dialogue.email_domain = email_domain;
            }
            if let Some(utc_offset_minutes) = dialogue.utc_offset_minutes {
                self.dialogue.utc_offset_minutes = utc_offset_minutes;
            }
            if let Some(turn_timeout_secs) = dialogue.turn_timeout_secs {
                self.dialogue.turn_timeout_secs = turn_timeout_secs;
            }
            if let Some(role_policy) = dialogue.role_policy {
                self.dialogue.role_policy = parse_role_policy(role_policy)?;
            }
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("RISEPAL_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("RISEPAL_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("RISEPAL_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("RISEPAL_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("RISEPAL_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("RISEPAL_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("RISEPAL_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("RISEPAL_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("RISEPAL_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("RISEPAL_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("RISEPAL_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("RISEPAL_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("RISEPAL_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("RISEPAL_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("RISEPAL_SERVER_PORT") {
            self.server.port = parse_u16("RISEPAL_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("RISEPAL_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("RISEPAL_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("RISEPAL_LOGGING_LEVEL").or_else(|| read_env("RISEPAL_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("RISEPAL_LOGGING_FORMAT").or_else(|| read_env("RISEPAL_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        if let Some(value) = read_env("RISEPAL_DIALOGUE_HISTORY_WINDOW") {
            self.dialogue.history_window = parse_u32("RISEPAL_DIALOGUE_HISTORY_WINDOW", &value)?;
        }
        if let Some(value) = read_env("RISEPAL_DIALOGUE_UPDATE_POLICY") {
            self.dialogue.update_policy = value.parse().map_err(|_| {
                ConfigError::InvalidEnvOverride {
                    key: "RISEPAL_DIALOGUE_UPDATE_POLICY".to_string(),
                    value: value.clone(),
                }
            })?;
        }
        if let Some(value) = read_env("RISEPAL_DIALOGUE_EMAIL_DOMAIN") {
            self.dialogue.email_domain = value;
        }
        if let Some(value) = read_env("RISEPAL_DIALOGUE_UTC_OFFSET_MINUTES") {
            self.dialogue.utc_offset_minutes =
                parse_i32("RISEPAL_DIALOGUE_UTC_OFFSET_MINUTES", &value)?;
        }
        if let Some(value) = read_env("RISEPAL_DIALOGUE_TURN_TIMEOUT_SECS") {
            self.dialogue.turn_timeout_secs =
                parse_u64("RISEPAL_DIALOGUE_TURN_TIMEOUT_SECS", &value)?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(update_policy) = overrides.update_policy {
            self.dialogue.update_policy = update_policy;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        validate_dialogue(&self.dialogue)?;
        Ok(())
    }

    /// Effective configuration as JSON with secrets replaced by a marker.
    pub fn redacted_json(&self) -> serde_json::Value {
        let role_policy = self
            .dialogue
            .role_policy
            .table()
            .iter()
            .map(|(role, intents)| {
                let intents = intents.iter().map(|intent| intent.as_str()).collect::<Vec<_>>();
                (role.as_str().to_string(), serde_json::json!(intents))
            })
            .collect::<serde_json::Map<_, _>>();

        serde_json::json!({
            "database": {
                "url": self.database.url,
                "max_connections": self.database.max_connections,
                "timeout_secs": self.database.timeout_secs,
            },
            "llm": {
                "provider": self.llm.provider.as_str(),
                "api_key": self.llm.api_key.as_ref().map(|_| "[redacted]"),
                "base_url": self.llm.base_url,
                "model": self.llm.model,
                "timeout_secs": self.llm.timeout_secs,
                "max_retries": self.llm.max_retries,
            },
            "server": {
                "bind_address": self.server.bind_address,
                "port": self.server.port,
                "graceful_shutdown_secs": self.server.graceful_shutdown_secs,
            },
            "logging": {
                "level": self.logging.level,
                "format": self.logging.format,
            },
            "dialogue": {
                "history_window": self.dialogue.history_window,
                "update_policy": self.dialogue.update_policy,
                "email_domain": self.dialogue.email_domain,
                "utc_offset_minutes": self.dialogue.utc_offset_minutes,
                "turn_timeout_secs": self.dialogue.turn_timeout_secs,
                "role_policy": role_policy,
            },
        })
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("risepal.toml"), PathBuf::from("config/risepal.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

/// Roles absent from the file keep only `other`; a typo in a role or intent name
/// fails the load instead of silently granting nothing.
fn parse_role_policy(raw: BTreeMap<String, Vec<String>>) -> Result<RolePolicy, ConfigError> {
    let mut table = BTreeMap::<Role, BTreeSet<Intent>>::new();
    for (role_name, intent_names) in raw {
        let role = role_name.parse::<Role>().map_err(|_| {
            ConfigError::Validation(format!(
                "dialogue.role_policy has unknown role `{role_name}` (expected admin|manager|employee)"
            ))
        })?;
        let intents = table.entry(role).or_default();
        for intent_name in intent_names {
            let intent = intent_name.parse::<Intent>().map_err(|_| {
                ConfigError::Validation(format!(
                    "dialogue.role_policy.{role_name} has unknown intent `{intent_name}`"
                ))
            })?;
            intents.insert(intent);
        }
    }
    Ok(RolePolicy::new(table))
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    match llm.provider {
        LlmProvider::OpenAi | LlmProvider::Anthropic => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai/anthropic providers (set RISEPAL_LLM_API_KEY)"
                        .to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    if let Some(base_url) = &llm.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn validate_dialogue(dialogue: &DialogueConfig) -> Result<(), ConfigError> {
    if dialogue.history_window == 0 || dialogue.history_window > 50 {
        return Err(ConfigError::Validation(
            "dialogue.history_window must be in range 1..=50".to_string(),
        ));
    }

    let domain = dialogue.email_domain.trim();
    if domain.is_empty() || domain.contains('@') || !domain.contains('.') {
        return Err(ConfigError::Validation(
            "dialogue.email_domain must be a bare domain such as `example.com`".to_string(),
        ));
    }

    if dialogue.utc_offset_minutes.abs() > 14 * 60 {
        return Err(ConfigError::Validation(
            "dialogue.utc_offset_minutes must be within -840..=840".to_string(),
        ));
    }

    if dialogue.turn_timeout_secs == 0 || dialogue.turn_timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "dialogue.turn_timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_i32(key: &str, value: &str) -> Result<i32, ConfigError> {
    value.parse::<i32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
    dialogue: Option<DialoguePatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[derive(Debug, Default, Deserialize)]
struct DialoguePatch {
    history_window: Option<u32>,
    update_policy: Option<UpdatePolicy>,
    email_domain: Option<String>,
    utc_offset_minutes: Option<i32>,
    turn_timeout_secs: Option<u64>,
    role_policy: Option<BTreeMap<String, Vec<String>>>,
}
