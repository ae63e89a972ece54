mod auth;
mod config;
mod context;
mod dashboard;
mod docs;
mod errors;
mod friends;
mod import;
mod schemas;
mod serialized;
mod tasks;
mod users;

use std::{
    io,
    net::{Ipv6Addr, SocketAddr},
    sync::Arc,
};

use axum::routing::get;
use log::info;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use udo_collab::Collab;

pub use config::*;
pub use context::*;
pub use errors::*;

pub type Router = axum::Router<ServerContext>;

/// Starts the U-Do server
pub async fn run_server(collab: Arc<Collab>, config: &ServerConfig) -> io::Result<()> {
    let addr: SocketAddr = (Ipv6Addr::UNSPECIFIED, config.port).into();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let context = ServerContext {
        collab,
        migration_secret: config.migration_secret.as_deref().map(Arc::from),
    };

    let version_one_router = Router::new()
        .nest("/auth", auth::router())
        .nest("/users", users::router())
        .nest("/tasks", tasks::router())
        .nest("/friends", friends::router())
        .nest("/dashboard", dashboard::router())
        .nest("/import", import::router());

    let root_router = Router::new()
        .nest("/v1", version_one_router)
        .route("/api.json", get(docs::docs))
        .layer(cors)
        .with_state(context);

    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, root_router.into_make_service()).await
}
