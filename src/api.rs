//! Telephony webhooks and the call-history API

mod handlers;
mod types;

pub use handlers::create_router;
pub use types::*;

use crate::db::Database;
use crate::runtime::CallManager;
use crate::voice::AudioCache;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub calls: Arc<CallManager>,
    pub db: Database,
    pub audio: Arc<AudioCache>,
    /// Scheme and host prefixed to URLs handed to Twilio; empty for relative URLs
    pub public_base: String,
}

impl AppState {
    pub fn new(
        calls: Arc<CallManager>,
        db: Database,
        audio: Arc<AudioCache>,
        public_host: Option<&str>,
    ) -> Self {
        Self {
            calls,
            db,
            audio,
            public_base: public_host.map(public_base).unwrap_or_default(),
        }
    }

    /// Absolute URL for a path on this server, when the public host is known
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.public_base)
    }
}

/// `PUBLIC_HOST` may be a bare host or a full origin
fn public_base(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.is_empty() {
        String::new()
    } else if host.contains("://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}
