//! # Lumo
//!
//! Client-side offline action queue for the Lumo learning app.
//!
//! User actions (ticking off a routine item, asking the coach for a
//! message) are written to a durable local journal first and replayed
//! against the remote batch endpoint whenever connectivity allows.
//!
//! ```rust,no_run
//! use lumo::{ActionKind, ClientConfig, Connectivity, OfflineQueue};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn run() -> lumo::Result<()> {
//! let config = ClientConfig::from_env()?;
//! let connectivity = Connectivity::new(true);
//! let queue = Arc::new(OfflineQueue::open(config, connectivity.clone())?);
//!
//! queue.enqueue(ActionKind::MarkRoutineItem, json!({"itemId": 12}))?;
//!
//! // flush now and on every reconnect until `sync` is dropped
//! let sync = queue.start_sync();
//! connectivity.set_online(false);
//! connectivity.set_online(true);
//! sync.stop();
//! # Ok(())
//! # }
//! ```
//!
//! The live multiplayer session view lives in the companion
//! `lumo-multiplayer` crate.

pub mod batch;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod queue;
pub mod store;
pub mod types;

pub use batch::BatchClient;
pub use config::ClientConfig;
pub use connectivity::Connectivity;
pub use error::{LumoError, Result};
pub use queue::{OfflineQueue, SyncHandle};
pub use store::QueueStore;
pub use types::*;
