//! Configuration loader with two-layer merge and env overrides.
//!
//! The loading process:
//! 1. Read the global file `<config_dir>/mnp-chat/mnp-chat.json`
//! 2. Read the local file `./mnp-chat.json`
//! 3. Merge at the JSON value level (RFC 7396), local over global
//! 4. Deserialize once into [`ChatConfig`]
//! 5. Apply `MNP_CHAT_*` environment overrides
//! 6. Run advisory validation

use super::ChatConfig;
use super::merge::merge_patch;
use super::validation::{self, AdvisoryWarning};
use crate::error::{ChatError, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Filename for the local config.
pub const LOCAL_FILE: &str = "mnp-chat.json";
/// Directory under the platform config dir.
pub const GLOBAL_DIR: &str = "mnp-chat";
/// Filename for the global config.
pub const GLOBAL_FILE: &str = "mnp-chat.json";

/// REST base URL override.
pub const ENV_API_URL: &str = "MNP_CHAT_API_URL";
/// WebSocket URL override.
pub const ENV_WS_URL: &str = "MNP_CHAT_WS_URL";
/// API key (env-only).
pub const ENV_API_KEY: &str = "MNP_CHAT_API_KEY";
/// Heartbeat interval override, milliseconds.
pub const ENV_HEARTBEAT_MS: &str = "MNP_CHAT_HEARTBEAT_MS";
/// Reconnect base delay override, milliseconds.
pub const ENV_RECONNECT_BASE_MS: &str = "MNP_CHAT_RECONNECT_BASE_MS";
/// Reconnect attempt cap override.
pub const ENV_MAX_RECONNECT_ATTEMPTS: &str = "MNP_CHAT_MAX_RECONNECT_ATTEMPTS";
/// Session token to resume.
pub const ENV_SESSION_TOKEN: &str = "MNP_CHAT_SESSION_TOKEN";

/// Resolved config file locations.
#[derive(Debug, Clone)]
pub struct ChatConfigPaths {
    /// Global file; `None` when the platform has no config dir.
    pub global: Option<PathBuf>,
    /// Local file.
    pub local: PathBuf,
}

impl ChatConfigPaths {
    /// Standard locations relative to `local_dir`.
    pub fn resolve(local_dir: &Path) -> Self {
        Self {
            global: dirs::config_dir().map(|base| base.join(GLOBAL_DIR).join(GLOBAL_FILE)),
            local: local_dir.join(LOCAL_FILE),
        }
    }
}

/// Result of loading configuration.
#[derive(Debug)]
pub struct LoadedChatConfig {
    /// Merged configuration.
    pub config: ChatConfig,
    /// Advisory warnings.
    pub warnings: Vec<AdvisoryWarning>,
    /// Files consulted.
    pub paths: ChatConfigPaths,
}

/// Load configuration from the standard locations relative to `local_dir`.
///
/// # Errors
///
/// Returns [`ChatError::Config`] when a file exists but cannot be read, is
/// not a JSON object, or does not deserialize.
pub fn load_merged(local_dir: &Path) -> Result<LoadedChatConfig> {
    load_from(ChatConfigPaths::resolve(local_dir))
}

/// Load configuration from explicit paths.
///
/// # Errors
///
/// See [`load_merged`].
pub fn load_from(paths: ChatConfigPaths) -> Result<LoadedChatConfig> {
    let global_v = match &paths.global {
        Some(p) => read_json_object_or_empty(p)?,
        None => Value::Object(serde_json::Map::new()),
    };
    let local_v = read_json_object_or_empty(&paths.local)?;

    let merged = merge_patch(global_v, local_v);
    let mut config: ChatConfig = serde_json::from_value(merged)
        .map_err(|e| ChatError::Config(format!("Failed to deserialize merged config: {e}")))?;

    apply_env_overrides(&mut config);

    let warnings = validation::validate(&config);
    for w in &warnings {
        tracing::debug!(code = w.code, path = w.path, "config warning: {}", w.message);
    }

    Ok(LoadedChatConfig {
        config,
        warnings,
        paths,
    })
}

/// Apply `MNP_CHAT_*` overrides. Unparseable numbers are ignored with a warning.
pub fn apply_env_overrides(cfg: &mut ChatConfig) {
    if let Some(v) = env_trimmed(ENV_API_URL) {
        cfg.api_url = v;
    }
    if let Some(v) = env_trimmed(ENV_WS_URL) {
        cfg.ws_url = v;
    }
    if let Some(k) = env_trimmed(ENV_API_KEY) {
        cfg.api_key = Some(secrecy::SecretString::from(k));
    }
    if let Some(v) = env_parsed(ENV_HEARTBEAT_MS) {
        cfg.heartbeat_interval_ms = v;
    }
    if let Some(v) = env_parsed(ENV_RECONNECT_BASE_MS) {
        cfg.reconnect_base_ms = v;
    }
    if let Some(v) = env_parsed(ENV_MAX_RECONNECT_ATTEMPTS) {
        cfg.max_reconnect_attempts = v;
    }
    if let Some(v) = env_trimmed(ENV_SESSION_TOKEN) {
        cfg.session_token = Some(v);
    }
}

fn env_trimmed(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env_trimmed(name)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(var = name, value = %raw, "ignoring non-numeric override");
            None
        }
    }
}

fn read_json_object_or_empty(path: &Path) -> Result<Value> {
    if !path.exists() {
        return Ok(Value::Object(serde_json::Map::new()));
    }

    let raw = std::fs::read_to_string(path).map_err(|e| {
        ChatError::Config(format!("Failed to read config file {}: {e}", path.display()))
    })?;
    let v: Value = serde_json::from_str(&raw)
        .map_err(|e| ChatError::Config(format!("Invalid JSON in {}: {e}", path.display())))?;

    match v {
        Value::Object(_) => Ok(v),
        _ => Err(ChatError::Config(format!(
            "Config root must be a JSON object: {}",
            path.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{EnvGuard, clear_chat_env};
    use serial_test::serial;
    use tempfile::TempDir;

    fn paths(dir: &TempDir) -> ChatConfigPaths {
        ChatConfigPaths {
            global: Some(dir.path().join("global.json")),
            local: dir.path().join(LOCAL_FILE),
        }
    }

    #[test]
    #[serial(env)]
    fn no_files_yield_defaults() {
        let _env = clear_chat_env();
        let dir = TempDir::new().unwrap();
        let loaded = load_from(paths(&dir)).unwrap();
        assert_eq!(loaded.config.api_url, super::super::DEFAULT_API_URL);
        assert_eq!(loaded.config.max_reconnect_attempts, 5);
        assert!(loaded.warnings.is_empty());
    }

    #[test]
    #[serial(env)]
    fn local_file_patches_global_file() {
        let _env = clear_chat_env();
        let dir = TempDir::new().unwrap();
        let p = paths(&dir);
        std::fs::write(
            p.global.as_ref().unwrap(),
            r#"{"apiUrl":"https://global/api","heartbeatIntervalMs":15000}"#,
        )
        .unwrap();
        std::fs::write(&p.local, r#"{"apiUrl":"https://local/api"}"#).unwrap();

        let cfg = load_from(p).unwrap().config;
        assert_eq!(cfg.api_url, "https://local/api");
        assert_eq!(cfg.heartbeat_interval_ms, 15000);
    }

    #[test]
    #[serial(env)]
    fn env_overrides_files() {
        let _env = clear_chat_env();
        let _url = EnvGuard::set(ENV_WS_URL, "  wss://env.example.com/ws ");
        let _att = EnvGuard::set(ENV_MAX_RECONNECT_ATTEMPTS, "2");
        let _hb = EnvGuard::set(ENV_HEARTBEAT_MS, "soon");
        let _key = EnvGuard::set(ENV_API_KEY, "k-123");

        let dir = TempDir::new().unwrap();
        let p = paths(&dir);
        std::fs::write(&p.local, r#"{"wsUrl":"ws://file/ws"}"#).unwrap();

        let cfg = load_from(p).unwrap().config;
        assert_eq!(cfg.ws_url, "wss://env.example.com/ws");
        assert_eq!(cfg.max_reconnect_attempts, 2);
        assert_eq!(cfg.heartbeat_interval_ms, 30_000);
        assert!(cfg.api_key.is_some());
    }

    #[test]
    #[serial(env)]
    fn non_object_root_is_an_error() {
        let _env = clear_chat_env();
        let dir = TempDir::new().unwrap();
        let p = paths(&dir);
        std::fs::write(&p.local, "[1,2,3]").unwrap();
        assert!(matches!(load_from(p), Err(ChatError::Config(_))));
    }

    #[test]
    #[serial(env)]
    fn warnings_are_reported_not_fatal() {
        let _env = clear_chat_env();
        let dir = TempDir::new().unwrap();
        let p = paths(&dir);
        std::fs::write(&p.local, r#"{"wsUrl":"http://wrong/ws"}"#).unwrap();
        let loaded = load_from(p).unwrap();
        assert_eq!(loaded.warnings.len(), 1);
    }
}
