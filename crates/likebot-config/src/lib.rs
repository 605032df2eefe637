use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use likebot_types::SubscriptionRecord;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON5 parse error: {0}")]
    Json5(#[from] json5::Error),
    #[error("JSON encode error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Config directory not found")]
    NoDirFound,
}

/// OneBot v11 connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneBotConfig {
    /// Base URL of the HTTP action API.
    #[serde(default = "default_http_url")]
    pub http_url: String,
    /// Forward WebSocket URL for events.
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    /// Access token sent as a bearer token (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

fn default_http_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_ws_url() -> String {
    "ws://127.0.0.1:3001".to_string()
}

impl Default for OneBotConfig {
    fn default() -> Self {
        Self {
            http_url: default_http_url(),
            ws_url: default_ws_url(),
            access_token: None,
        }
    }
}

/// OpenAI-compatible chat completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    /// Falls back to `OPENAI_API_KEY` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_llm_model")]
    pub model: String,
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key: None,
            model: default_llm_model(),
        }
    }
}

impl LlmConfig {
    /// Configured key, or `OPENAI_API_KEY` from the environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
    }
}

/// Top-level likebot configuration document.
///
/// `subscribe_data` lives in the same document and is rewritten on every
/// ledger mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Like units applied per like call.
    #[serde(default = "default_per_like_times")]
    pub per_like_times: u32,
    /// Run the daily random like for subscribers.
    #[serde(default = "default_true")]
    pub auto_like: bool,
    /// Refuse subscriptions and likes for non-friends.
    #[serde(default = "default_true")]
    pub only_like_friend: bool,
    /// Only react to messages that mention the bot or carry the wake prefix.
    #[serde(default)]
    pub need_prefix: bool,
    /// Probability of silently liking the sender of an ordinary message.
    #[serde(default)]
    pub random_like_prob: f64,
    #[serde(default = "default_wake_prefix")]
    pub wake_prefix: String,
    /// Accounts allowed to run admin commands.
    #[serde(default)]
    pub admins: Vec<String>,
    /// Cycle expression for the daily scheduler.
    #[serde(default = "default_cron_expr")]
    pub cron_expr: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_success_style")]
    pub llm_success_style: String,
    #[serde(default = "default_limit_style")]
    pub llm_limit_style: String,
    #[serde(default = "default_stranger_style")]
    pub llm_stranger_style: String,
    #[serde(default = "default_permission_style")]
    pub llm_permission_style: String,
    /// System prompt given to the LLM for every reply.
    #[serde(default = "default_persona_prompt")]
    pub persona_prompt: String,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub onebot: OneBotConfig,
    #[serde(default)]
    pub subscribe_data: Vec<SubscriptionRecord>,
}

fn default_per_like_times() -> u32 {
    10
}

fn default_true() -> bool {
    true
}

fn default_wake_prefix() -> String {
    "/".to_string()
}

fn default_cron_expr() -> String {
    "0 0 * * *".to_string()
}

fn default_timezone() -> String {
    "Asia/Shanghai".to_string()
}

fn default_success_style() -> String {
    "俏皮可爱，带点小得意".to_string()
}

fn default_limit_style() -> String {
    "无奈又有点撒娇".to_string()
}

fn default_stranger_style() -> String {
    "傲娇，暗示对方先加好友".to_string()
}

fn default_permission_style() -> String {
    "委屈，吐槽对方设了权限".to_string()
}

fn default_persona_prompt() -> String {
    "你是一个活泼友好的 QQ 机器人。".to_string()
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            per_like_times: default_per_like_times(),
            auto_like: true,
            only_like_friend: true,
            need_prefix: false,
            random_like_prob: 0.0,
            wake_prefix: default_wake_prefix(),
            admins: Vec::new(),
            cron_expr: default_cron_expr(),
            timezone: default_timezone(),
            llm_success_style: default_success_style(),
            llm_limit_style: default_limit_style(),
            llm_stranger_style: default_stranger_style(),
            llm_permission_style: default_permission_style(),
            persona_prompt: default_persona_prompt(),
            llm: LlmConfig::default(),
            onebot: OneBotConfig::default(),
            subscribe_data: Vec::new(),
        }
    }
}

/// Resolve the likebot config directory (~/.likebot/).
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|h| h.join(".likebot"))
        .ok_or(ConfigError::NoDirFound)
}

/// Resolve the config file path (~/.likebot/config.json5).
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.json5"))
}

/// Load configuration from a specific path, falling back to defaults if not found.
pub fn load_config_from(path: &Path) -> Result<PluginConfig, ConfigError> {
    if !path.exists() {
        tracing::debug!("Config file not found at {}, using defaults", path.display());
        return Ok(PluginConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: PluginConfig = json5::from_str(&content)?;
    Ok(config)
}

/// The host-side config document: an in-memory copy plus a synchronous flush.
pub struct ConfigStore {
    path: Option<PathBuf>,
    config: RwLock<PluginConfig>,
}

impl ConfigStore {
    /// Open the default config file (~/.likebot/config.json5).
    pub fn open_default() -> Result<Self, ConfigError> {
        // Load .env if present
        let _ = dotenvy::dotenv();

        let path = config_file_path()?;
        Self::open(&path)
    }

    /// Open the config document at `path`; a missing file yields defaults.
    pub fn open(path: &Path) -> Result<Self, ConfigError> {
        let config = load_config_from(path)?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            config: RwLock::new(config),
        })
    }

    /// A store with no backing file; `save` is a no-op.
    pub fn in_memory(config: PluginConfig) -> Self {
        Self {
            path: None,
            config: RwLock::new(config),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Snapshot of the current document.
    pub fn read(&self) -> PluginConfig {
        self.config
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Mutate the in-memory document. Call [`save`](Self::save) to flush.
    pub fn update<R>(&self, f: impl FnOnce(&mut PluginConfig) -> R) -> R {
        let mut config = self.config.write().unwrap_or_else(|e| e.into_inner());
        f(&mut config)
    }

    /// Write the whole document to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(dir) = path.parent() {
            if !dir.exists() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let content = {
            let config = self.config.read().unwrap_or_else(|e| e.into_inner());
            serde_json::to_string_pretty(&*config)?
        };
        std::fs::write(path, content)?;
        tracing::debug!("Config saved to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PluginConfig::default();
        assert_eq!(config.per_like_times, 10);
        assert!(config.auto_like);
        assert_eq!(config.cron_expr, "0 0 * * *");
        assert_eq!(config.timezone, "Asia/Shanghai");
        assert!(config.subscribe_data.is_empty());
    }

    #[test]
    fn test_json5_parse() {
        let json5_str = r#"{
            per_like_times: 20,
            only_like_friend: false,
            random_like_prob: 0.25,
            onebot: { http_url: "http://10.0.0.2:5700" },
            subscribe_data: [{ "123456": 10 }, { "987654": 5 }],
        }"#;
        let config: PluginConfig = json5::from_str(json5_str).unwrap();
        assert_eq!(config.per_like_times, 20);
        assert!(!config.only_like_friend);
        assert!((config.random_like_prob - 0.25).abs() < f64::EPSILON);
        assert_eq!(config.onebot.http_url, "http://10.0.0.2:5700");
        assert_eq!(config.onebot.ws_url, "ws://127.0.0.1:3001");
        assert_eq!(config.subscribe_data.len(), 2);
        assert_eq!(config.subscribe_data[1].user_id, "987654");
        assert_eq!(config.subscribe_data[1].like_count, 5);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::open(&dir.path().join("absent.json5")).unwrap();
        assert_eq!(store.read().per_like_times, 10);
    }

    #[test]
    fn test_save_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json5");
        let store = ConfigStore::open(&path).unwrap();

        store.update(|cfg| {
            cfg.per_like_times = 5;
            cfg.subscribe_data.push(SubscriptionRecord::new("42"));
        });
        store.save().unwrap();

        let reopened = ConfigStore::open(&path).unwrap();
        let cfg = reopened.read();
        assert_eq!(cfg.per_like_times, 5);
        assert_eq!(cfg.subscribe_data, vec![SubscriptionRecord::new("42")]);
    }

    #[test]
    fn test_in_memory_save_is_noop() {
        let store = ConfigStore::in_memory(PluginConfig::default());
        assert!(store.path().is_none());
        store.save().unwrap();
    }
}
