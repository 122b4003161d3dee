pub mod auth;
pub mod config;
pub mod directory;
pub mod error;
pub mod gateway;
pub mod routes;

use std::sync::Arc;

use tokio::sync::mpsc;

use auth::Authenticator;
use config::Config;
use directory::UserDirectory;
use gateway::presence::PresenceRecord;
use gateway::Gateway;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub directory: Arc<dyn UserDirectory>,
    pub authenticator: Arc<Authenticator>,
    pub gateway: Arc<Gateway>,
}

impl AppState {
    /// Wire the authenticator and gateway around `directory`. The returned
    /// receiver carries presence writes for [`gateway::presence::spawn_presence_writer`].
    pub fn new(
        config: Config,
        directory: Arc<dyn UserDirectory>,
    ) -> (Self, mpsc::UnboundedReceiver<PresenceRecord>) {
        let authenticator = Authenticator::new(&config.jwt_secret, directory.clone());
        let (gateway, writes) = Gateway::new(config.outbound_queue_capacity);

        let state = Self {
            config: Arc::new(config),
            directory,
            authenticator: Arc::new(authenticator),
            gateway: Arc::new(gateway),
        };
        (state, writes)
    }
}
