//! Live multiplayer session view for Lumo games.
//!
//! A [`SessionWatch`] fetches a session snapshot once, then follows the
//! push channel; whenever the channel is not connected it re-fetches on a
//! fixed interval instead.

pub mod client;
pub mod endpoints;
pub mod session;
pub mod types;

pub use client::SessionClient;
pub use endpoints::{push_url, session_url};
pub use session::{SessionView, SessionWatch, TransportState};
pub use types::{status_label, SessionState, SessionStatus};
