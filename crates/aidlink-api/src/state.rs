use std::sync::Arc;

use aidlink_core::channel::MessageChannel;
use aidlink_core::collab::{SqlitePostStore, SqliteProfileStore};
use aidlink_core::coordinator::InteractionCoordinator;
use aidlink_core::profile::ProfileResolver;
use aidlink_db::Database;
use aidlink_gateway::dispatcher::Dispatcher;

pub type AppState = Arc<AppStateInner>;

/// Shared handles for the HTTP handlers. Components get their storage and
/// collaborator handles here, once, instead of reaching for a global
/// client.
pub struct AppStateInner {
    pub db: Arc<Database>,
    pub coordinator: InteractionCoordinator,
    pub channel: MessageChannel,
    pub resolver: Arc<ProfileResolver>,
    pub dispatcher: Dispatcher,
    pub jwt_secret: String,
}

impl AppStateInner {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher, jwt_secret: String) -> Self {
        let posts = Arc::new(SqlitePostStore::new(db.clone()));
        let profiles = Arc::new(SqliteProfileStore::new(db.clone()));

        Self {
            coordinator: InteractionCoordinator::new(db.clone(), posts),
            channel: MessageChannel::new(db.clone()),
            resolver: Arc::new(ProfileResolver::new(profiles)),
            dispatcher,
            jwt_secret,
            db,
        }
    }
}
