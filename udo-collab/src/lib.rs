mod auth;
mod dashboard;
mod db;
mod error;
mod friends;
mod import;
mod tasks;
mod users;
mod util;

#[cfg(test)]
mod testing;

use std::sync::Arc;

pub use auth::*;
pub use dashboard::*;
pub use db::*;
pub use error::*;
pub use friends::*;
pub use import::*;
pub use tasks::*;
pub use users::*;

use udo_core::Config;

/// The U-Do collab system, facilitating tasks, friendships, and authentication.
pub struct Collab {
    context: CollabContext,

    pub auth: Auth,
    pub users: UserDirectory,
    pub tasks: TaskStore,
    pub friends: FriendshipGraph,
    pub dashboard: Dashboard,
    pub importer: Importer,
}

/// A type passed to the services of the collab system, to access storage and configuration.
#[derive(Clone)]
pub struct CollabContext {
    pub database: SharedDatabase,
    pub config: Config,
}

impl Collab {
    pub fn new(database: SharedDatabase, config: Config, code_sender: Arc<dyn CodeSender>) -> Self {
        let context = CollabContext { database, config };

        Self {
            auth: Auth::new(&context, code_sender),
            users: UserDirectory::new(&context),
            tasks: TaskStore::new(&context),
            friends: FriendshipGraph::new(&context),
            dashboard: Dashboard::new(&context),
            importer: Importer::new(&context),
            context,
        }
    }

    pub fn config(&self) -> &Config {
        &self.context.config
    }
}
