use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderName;

use matchline_db::Database;
use matchline_gateway::{Registry, Relay};
use matchline_match::Recommender;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub relay: Relay,
    pub recommender: Recommender,
    /// Header carrying the caller's verified user id.
    pub identity_header: HeaderName,
    pub socket_write_timeout: Duration,
}

/// Knobs the binary reads from its environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub identity_header: HeaderName,
    pub recent_ttl: Duration,
    pub socket_write_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            identity_header: HeaderName::from_static("x-authenticated-user"),
            recent_ttl: Duration::from_secs(900),
            socket_write_timeout: Duration::from_millis(5000),
        }
    }
}

impl AppStateInner {
    pub fn new(db: Arc<Database>, settings: Settings) -> AppState {
        let relay = Relay::new(db.clone(), Registry::new());
        let recommender = Recommender::new(db.clone(), settings.recent_ttl);
        Arc::new(Self {
            db,
            relay,
            recommender,
            identity_header: settings.identity_header,
            socket_write_timeout: settings.socket_write_timeout,
        })
    }

    pub fn registry(&self) -> &Registry {
        self.relay.registry()
    }
}
