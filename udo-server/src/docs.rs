use axum::{response::IntoResponse, Json};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipauto::utoipauto;

#[utoipauto(paths = "./udo-server/src")]
#[derive(OpenApi)]
#[openapi(
    modifiers(&Security),
    info(
        title = "U-Do API",
        description = "udo-server exposes endpoints to manage tasks and share them with friends"
    ))
]
pub struct ApiDoc;

struct Security;

impl Modify for Security {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);

        let session = HttpBuilder::new()
            .scheme(HttpAuthScheme::Bearer)
            .bearer_format("Bearer <token>")
            .build();

        let migration = HttpBuilder::new()
            .scheme(HttpAuthScheme::Bearer)
            .bearer_format("Bearer <migration secret>")
            .build();

        components.add_security_scheme("BearerAuth", SecurityScheme::Http(session));
        components.add_security_scheme("MigrationSecret", SecurityScheme::Http(migration));
    }
}

pub async fn docs() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
