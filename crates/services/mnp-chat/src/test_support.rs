//! Test-only helpers for the process environment the config loader reads.

use crate::config::loader::{
    ENV_API_KEY, ENV_API_URL, ENV_HEARTBEAT_MS, ENV_MAX_RECONNECT_ATTEMPTS,
    ENV_RECONNECT_BASE_MS, ENV_SESSION_TOKEN, ENV_WS_URL,
};

/// Every variable [`crate::config::loader::apply_env_overrides`] reads.
pub const CHAT_ENV_VARS: [&str; 7] = [
    ENV_API_URL,
    ENV_WS_URL,
    ENV_API_KEY,
    ENV_HEARTBEAT_MS,
    ENV_RECONNECT_BASE_MS,
    ENV_MAX_RECONNECT_ATTEMPTS,
    ENV_SESSION_TOKEN,
];

/// Restores one environment variable on drop.
///
/// Mutating the environment races with concurrent readers; tests using this
/// run under `#[serial(env)]`.
pub struct EnvGuard {
    key: &'static str,
    prev: Option<String>,
}

impl EnvGuard {
    /// Sets `key` until the guard drops.
    #[must_use]
    pub fn set(key: &'static str, val: &str) -> Self {
        let prev = std::env::var(key).ok();
        // SAFETY: callers serialize environment access with `#[serial(env)]`.
        unsafe { std::env::set_var(key, val) };
        Self { key, prev }
    }

    /// Unsets `key` until the guard drops.
    #[must_use]
    pub fn remove(key: &'static str) -> Self {
        let prev = std::env::var(key).ok();
        // SAFETY: callers serialize environment access with `#[serial(env)]`.
        unsafe { std::env::remove_var(key) };
        Self { key, prev }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        // SAFETY: the guard lives inside a `#[serial(env)]` test.
        match &self.prev {
            Some(v) => unsafe { std::env::set_var(self.key, v) },
            None => unsafe { std::env::remove_var(self.key) },
        }
    }
}

/// Unsets every chat variable so a test sees file and default values only.
#[must_use]
pub fn clear_chat_env() -> Vec<EnvGuard> {
    CHAT_ENV_VARS.into_iter().map(EnvGuard::remove).collect()
}
