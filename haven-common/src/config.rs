//! Configuration management for Haven.
//!
//! The server reads a single configuration file at `~/.haven/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (HAVEN_* prefix)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `HAVEN_BIND_ADDRESS` → server.host
//! - `HAVEN_PORT` → server.port
//! - `HAVEN_STATIC_DIR` → server.static_dir
//! - `HAVEN_MODEL_BACKEND` → model.backend
//! - `HAVEN_MODEL_URL` → model.base_url
//! - `HAVEN_MODEL` → model.model
//! - `HAVEN_MODEL_API_KEY` → model.api_key
//! - `HAVEN_LOG_LEVEL` → observability.log_level
//! - `HAVEN_LOG_FORMAT` → observability.log_format

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".haven"),
        |dirs| dirs.home_dir().join(".haven"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Instruction placed at the top of every prompt.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a mental health support assistant trained on mental health conversations.

Respond in simple, easy-to-understand language like you're talking to a friend. Keep answers short and natural (1-3 sentences).

Your approach:
- Be warm and understanding
- Use everyday words, not medical terms
- Share simple coping tips when helpful
- Suggest talking to a professional if needed
- Never diagnose or give medical advice

You're here to listen and support, not to replace therapy.";

// ============================================================================
// Server Configuration
// ============================================================================

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address. Default is `127.0.0.1` (local only).
    #[serde(default = "default_host")]
    pub host: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory holding the chat UI assets (served at `/`)
    #[serde(default = "default_static_dir")]
    pub static_dir: String,

    /// Maximum accepted request body size in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: default_static_dir(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    5000
}

fn default_static_dir() -> String {
    "static".into()
}

fn default_max_body_bytes() -> usize {
    64 * 1024
}

// ============================================================================
// Model Configuration
// ============================================================================

/// Which text-generation backend serves the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelBackend {
    /// Ollama `/api/generate`
    #[default]
    Ollama,
    /// OpenAI-compatible `/v1/completions` (llama.cpp server, vLLM, TGI)
    Completions,
}

impl ModelBackend {
    /// Base URL used when none is configured.
    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::Ollama => "http://localhost:11434",
            Self::Completions => "http://localhost:8080",
        }
    }
}

impl FromStr for ModelBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "completions" | "openai" | "llamacpp" => Ok(Self::Completions),
            other => Err(format!("unknown model backend: {other}")),
        }
    }
}

/// Model and sampling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Backend serving the model
    #[serde(default)]
    pub backend: ModelBackend,

    /// Backend base URL (defaults per backend)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Model identifier understood by the backend
    #[serde(default = "default_model")]
    pub model: String,

    /// Bearer key for backends that require one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Upper bound on generated tokens
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Nucleus sampling threshold
    #[serde(default = "default_top_p")]
    pub top_p: f64,

    /// Generation timeout in seconds. Unset means wait indefinitely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            backend: ModelBackend::default(),
            base_url: None,
            model: default_model(),
            api_key: None,
            max_new_tokens: default_max_new_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            timeout_secs: None,
        }
    }
}

impl ModelConfig {
    /// Configured base URL, or the backend default.
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.backend.default_base_url())
    }
}

fn default_model() -> String {
    "dhruvin0612/mental_health_assistant_1.1B".into()
}

fn default_max_new_tokens() -> u32 {
    256
}

fn default_temperature() -> f64 {
    0.7
}

fn default_top_p() -> f64 {
    0.9
}

// ============================================================================
// Chat Configuration
// ============================================================================

/// Conversation behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Exchanges kept per session
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Session key used when a request carries none
    #[serde(default = "default_session_id")]
    pub default_session_id: String,

    /// Instruction placed before the history in every prompt
    #[serde(default = "default_system_instruction")]
    pub system_instruction: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            default_session_id: default_session_id(),
            system_instruction: default_system_instruction(),
        }
    }
}

/// Upper bound accepted for `chat.history_limit`.
pub const MAX_HISTORY_LIMIT: usize = 100;

fn default_history_limit() -> usize {
    5
}

fn default_session_id() -> String {
    "default".into()
}

fn default_system_instruction() -> String {
    DEFAULT_SYSTEM_INSTRUCTION.into()
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Root
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub chat: ChatConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration (default path or `path`) with environment overrides applied.
    pub fn load_with_env(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
                Self::load_from(Path::new(&expanded))?
            }
            None => Self::load()?,
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable source.
    pub fn apply_overrides<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = var("HAVEN_BIND_ADDRESS") {
            self.server.host = host;
        }
        if let Some(port) = var("HAVEN_PORT") {
            match port.parse() {
                Ok(p) => self.server.port = p,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid HAVEN_PORT"),
            }
        }
        if let Some(dir) = var("HAVEN_STATIC_DIR") {
            self.server.static_dir = dir;
        }

        if let Some(backend) = var("HAVEN_MODEL_BACKEND") {
            match backend.parse() {
                Ok(b) => self.model.backend = b,
                Err(e) => tracing::warn!(error = %e, "Ignoring invalid HAVEN_MODEL_BACKEND"),
            }
        }
        if let Some(url) = var("HAVEN_MODEL_URL") {
            self.model.base_url = Some(url);
        }
        if let Some(model) = var("HAVEN_MODEL") {
            self.model.model = model;
        }
        if let Some(key) = var("HAVEN_MODEL_API_KEY") {
            self.model.api_key = Some(key);
        }

        if let Some(level) = var("HAVEN_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = var("HAVEN_LOG_FORMAT") {
            self.observability.log_format = format;
        }
    }

    /// Socket address the server binds to.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .server
            .host
            .parse()
            .with_context(|| format!("Invalid bind address: {}", self.server.host))?;
        Ok(SocketAddr::from((ip, self.server.port)))
    }

    /// Static asset directory with `~` expanded.
    pub fn static_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.server.static_dir).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.model.backend, ModelBackend::Ollama);
        assert_eq!(config.model.max_new_tokens, 256);
        assert!((config.model.temperature - 0.7).abs() < f64::EPSILON);
        assert!((config.model.top_p - 0.9).abs() < f64::EPSILON);
        assert_eq!(config.chat.history_limit, 5);
        assert_eq!(config.chat.default_session_id, "default");
        assert!(config.chat.system_instruction.starts_with("You are a mental health"));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"server": {"port": 8081}, "model": {"backend": "completions"}}"#)
                .unwrap();
        assert_eq!(config.server.port, 8081);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.model.backend, ModelBackend::Completions);
        assert_eq!(config.model.base_url(), "http://localhost:8080");
        assert_eq!(config.chat.history_limit, 5);
    }

    #[test]
    fn test_observability_aliases() {
        let config: Config =
            serde_json::from_str(r#"{"observability": {"level": "debug", "format": "json"}}"#)
                .unwrap();
        assert_eq!(config.observability.log_level, "debug");
        assert_eq!(config.observability.log_format, "json");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"chat": {{"history_limit": 3}}}}"#).unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.chat.history_limit, 3);
    }

    #[test]
    fn test_load_from_invalid_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let err = Config::load_from(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    fn test_apply_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("HAVEN_BIND_ADDRESS", "0.0.0.0"),
            ("HAVEN_PORT", "9000"),
            ("HAVEN_MODEL_BACKEND", "completions"),
            ("HAVEN_MODEL_URL", "http://gpu-box:8000"),
            ("HAVEN_MODEL", "tinyllama"),
            ("HAVEN_LOG_LEVEL", "debug"),
        ]);

        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.model.backend, ModelBackend::Completions);
        assert_eq!(config.model.base_url(), "http://gpu-box:8000");
        assert_eq!(config.model.model, "tinyllama");
        assert_eq!(config.observability.log_level, "debug");
    }

    #[test]
    fn test_invalid_port_override_is_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|key| (key == "HAVEN_PORT").then(|| "not-a-port".to_string()));
        assert_eq!(config.server.port, 5000);
    }

    #[test]
    fn test_socket_addr() {
        let config = Config::default();
        assert_eq!(config.socket_addr().unwrap().to_string(), "127.0.0.1:5000");

        let mut bad = Config::default();
        bad.server.host = "localhost:abc".into();
        assert!(bad.socket_addr().is_err());
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("Ollama".parse::<ModelBackend>().unwrap(), ModelBackend::Ollama);
        assert_eq!("openai".parse::<ModelBackend>().unwrap(), ModelBackend::Completions);
        assert!("transformers".parse::<ModelBackend>().is_err());
    }
}
