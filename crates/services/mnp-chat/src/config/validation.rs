//! Advisory validation for [`ChatConfig`].
//!
//! Produces warnings only; a questionable config is still usable.

use super::ChatConfig;

/// An advisory warning about a configuration issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvisoryWarning {
    /// Machine-readable warning code.
    pub code: &'static str,
    /// Human-readable warning message.
    pub message: String,
    /// JSON path of the offending field.
    pub path: &'static str,
}

impl std::fmt::Display for AdvisoryWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.code, self.path, self.message)
    }
}

/// Validate a configuration and return advisory warnings.
pub fn validate(cfg: &ChatConfig) -> Vec<AdvisoryWarning> {
    let mut warnings = vec![];

    validate_scheme(
        &cfg.api_url,
        &["http", "https"],
        "apiUrl",
        "api_url.invalid",
        &mut warnings,
    );
    validate_scheme(
        &cfg.ws_url,
        &["ws", "wss"],
        "wsUrl",
        "ws_url.invalid",
        &mut warnings,
    );

    for (value, path, code) in [
        (cfg.heartbeat_interval_ms, "heartbeatIntervalMs", "heartbeat.zero"),
        (cfg.reconnect_base_ms, "reconnectBaseMs", "reconnect_base.zero"),
        (cfg.connect_timeout_ms, "connectTimeoutMs", "connect_timeout.zero"),
        (cfg.request_timeout_ms, "requestTimeoutMs", "request_timeout.zero"),
    ] {
        if value == 0 {
            warnings.push(AdvisoryWarning {
                code,
                path,
                message: "Interval must be greater than zero".into(),
            });
        }
    }

    if cfg.reconnect_max_delay_ms < cfg.reconnect_base_ms {
        warnings.push(AdvisoryWarning {
            code: "reconnect_max_delay.below_base",
            path: "reconnectMaxDelayMs",
            message: format!(
                "Cap {}ms is below the base delay {}ms; every attempt waits the cap",
                cfg.reconnect_max_delay_ms, cfg.reconnect_base_ms
            ),
        });
    }

    if cfg.max_reconnect_attempts == 0 {
        warnings.push(AdvisoryWarning {
            code: "max_reconnect_attempts.zero",
            path: "maxReconnectAttempts",
            message: "Automatic reconnection is disabled".into(),
        });
    }

    if cfg.pong_timeout_heartbeats == Some(0) {
        warnings.push(AdvisoryWarning {
            code: "pong_timeout_heartbeats.zero",
            path: "pongTimeoutHeartbeats",
            message: "Zero closes the socket on the first heartbeat; omit the field to disable"
                .into(),
        });
    }

    if cfg
        .session_token
        .as_deref()
        .is_some_and(|t| t.trim().is_empty())
    {
        warnings.push(AdvisoryWarning {
            code: "session_token.empty",
            path: "sessionToken",
            message: "Value cannot be empty".into(),
        });
    }

    warnings
}

fn validate_scheme(
    raw: &str,
    schemes: &[&str],
    path: &'static str,
    code: &'static str,
    warnings: &mut Vec<AdvisoryWarning>,
) {
    match url::Url::parse(raw) {
        Ok(u) if schemes.contains(&u.scheme()) => {}
        Ok(u) => warnings.push(AdvisoryWarning {
            code,
            path,
            message: format!(
                "Expected a {} URL, got scheme '{}'",
                schemes.join("/"),
                u.scheme()
            ),
        }),
        Err(e) => warnings.push(AdvisoryWarning {
            code,
            path,
            message: format!("Not a valid URL '{raw}': {e}"),
        }),
    }
}
