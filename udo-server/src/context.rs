use std::sync::Arc;

use axum::extract::FromRef;
use udo_collab::Collab;

#[derive(Clone, FromRef)]
pub struct ServerContext {
    pub collab: Arc<Collab>,
    /// Guards the import endpoints
    pub migration_secret: Option<Arc<str>>,
}
