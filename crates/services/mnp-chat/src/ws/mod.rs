//! Real-time channel: envelope codec, drop diagnostics and the connection
//! manager.

/// Envelope encoding and decoding
pub mod codec;
/// Dropped-frame counters
pub mod diagnostics;
mod manager;

pub use codec::{DecodeError, Envelope, EnvelopeKind};
pub use diagnostics::{DiagnosticsSnapshot, ProtocolDiagnostics};
pub use manager::{ConnectionManager, ConnectionOptions, ConnectionState, Phase};
