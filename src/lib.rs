//! nodeline library -- line-oriented TCP node registry service.
//!
//! Clients send one text command per line; each line is tagged with the
//! connection's session, parsed into a verb, dispatched (possibly against
//! the file-backed node registry) and answered with a message followed by
//! a prompt.

use std::sync::Arc;

pub mod config;
pub mod dispatch;
pub mod errors;
pub mod metrics;
pub mod registry;
pub mod server;
pub mod session;
pub mod verb;

use crate::config::Config;
use crate::registry::NodeRegistry;

/// Shared application state handed to every connection task.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// The process-wide node registry.
    pub registry: Arc<NodeRegistry>,
}
