//! Counters for inbound frames the connection manager dropped.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Tracing target for protocol-level events.
pub const PROTOCOL_TARGET: &str = "mnp_chat::protocol";

/// Shared drop counters. Cheap to clone behind an `Arc`.
#[derive(Debug, Default)]
pub struct ProtocolDiagnostics {
    malformed: AtomicU64,
    unknown_kind: AtomicU64,
    incomplete_message: AtomicU64,
}

/// Point-in-time copy of [`ProtocolDiagnostics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    /// Frames that were not valid envelopes.
    pub malformed: u64,
    /// Envelopes with a kind outside the closed set.
    pub unknown_kind: u64,
    /// `message` envelopes missing `content` or `messageId`.
    pub incomplete_message: u64,
}

impl ProtocolDiagnostics {
    pub(crate) fn record_malformed(&self, error: &str) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(target: PROTOCOL_TARGET, error, "dropping malformed envelope");
    }

    pub(crate) fn record_unknown_kind(&self, kind: &str) {
        self.unknown_kind.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(target: PROTOCOL_TARGET, kind, "dropping envelope of unknown kind");
    }

    pub(crate) fn record_incomplete_message(&self, has_id: bool, has_content: bool) {
        self.incomplete_message.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            target: PROTOCOL_TARGET,
            has_id,
            has_content,
            "dropping message envelope without id or content"
        );
    }

    /// Current counter values.
    #[must_use]
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            malformed: self.malformed.load(Ordering::Relaxed),
            unknown_kind: self.unknown_kind.load(Ordering::Relaxed),
            incomplete_message: self.incomplete_message.load(Ordering::Relaxed),
        }
    }
}
