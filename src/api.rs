//! HTTP API for axon

mod handlers;
mod sse;
mod types;

pub use handlers::create_router;

use crate::agent::Agent;
use crate::db::Database;
use crate::llm::ResponsesTransport;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Per-session agent cache.
///
/// The outer mutex guards the map; each agent's own mutex serializes
/// invocations so at most one turn runs per conversation at a time.
pub type SessionMap = Arc<Mutex<HashMap<String, Arc<Mutex<Agent>>>>>;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub transport: Arc<dyn ResponsesTransport>,
    pub sessions: SessionMap,
    pub api_key_present: bool,
}

impl AppState {
    pub fn new(db: Database, transport: Arc<dyn ResponsesTransport>, api_key_present: bool) -> Self {
        Self {
            db,
            transport,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            api_key_present,
        }
    }
}
