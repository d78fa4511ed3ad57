#![deny(rust_2018_idioms)]
#![warn(missing_docs)]

//! Client core for the MNP (mobile number portability) support assistant.
//!
//! - [`store::ChatStore`]: conversation state with optimistic sends, local
//!   fallback replies and the escalation lifecycle.
//! - [`ws::ConnectionManager`]: one WebSocket per session with heartbeat and
//!   exponential-backoff reconnection, feeding inbound events into the store.
//! - [`http::ApiClient`]: the REST backend, with retries on transient failures.
//!
//! ```no_run
//! use std::sync::Arc;
//! use mnp_chat::prelude::*;
//!
//! # async fn demo() -> mnp_chat::Result<()> {
//! let config = ChatConfig::default();
//! let api = Arc::new(ApiClient::new(&config)?);
//! let store = ChatStore::new(api.clone(), StoreOptions::from_config(&config));
//! store.start_new_session(ChatMode::StepByStep);
//!
//! let conn = ConnectionManager::spawn(ConnectionOptions::from_config(&config), api, store.clone());
//! conn.connect().await?;
//! store.send_message("How do I get a reservation number?").await?;
//! # Ok(())
//! # }
//! ```

/// Configuration types and loader
pub mod config;
/// Error types
pub mod error;
/// REST client and backend seams
pub mod http;
/// Retry and backoff utilities
pub mod retry;
/// Conversation store
pub mod store;
/// Test support utilities (for use in tests)
#[doc(hidden)]
pub mod test_support;
/// Data model
pub mod types;
/// WebSocket transport
pub mod ws;

pub use crate::config::ChatConfig;
pub use crate::error::{ApiErrorObject, ChatError, Result};
pub use crate::http::{ApiClient, ChatBackend, TokenProvider};
pub use crate::store::{ChatState, ChatStore, StoreOptions};
pub use crate::ws::{ConnectionManager, ConnectionOptions, ConnectionState};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::types::*;
    pub use crate::ws::{Envelope, EnvelopeKind};
    pub use crate::{
        ApiClient, ChatBackend, ChatConfig, ChatError, ChatState, ChatStore, ConnectionManager,
        ConnectionOptions, ConnectionState, StoreOptions, TokenProvider,
    };
}
