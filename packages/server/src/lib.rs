pub mod archive;
pub mod config;
pub mod database;
pub mod entity;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod seed;
pub mod state;
pub mod utils;

use axum::http::HeaderValue;
use tower_http::cors::{AllowOrigin, CorsLayer};
use utoipa::OpenApi;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa_scalar::{Scalar, Servable as ScalarServable};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::CorsConfig;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Tilleul Course Platform API",
        version = "1.0.0",
        description = "Activity and deposit engine of the Tilleul course platform"
    ),
    paths(
        handlers::activity::create_activity,
        handlers::activity::list_activities,
        handlers::activity::get_activity,
        handlers::activity::update_activity,
        handlers::activity::replace_activity_file,
        handlers::activity::delete_activity,
        handlers::activity::reclassify_activity,
        handlers::completion::mark_complete,
        handlers::completion::completion_rate,
        handlers::deposit::submit_deposit,
        handlers::deposit::replace_deposit,
        handlers::deposit::withdraw_deposit,
        handlers::deposit::get_my_deposit,
        handlers::deposit::list_deposits,
        handlers::deposit::grade_deposit,
        handlers::deposit::export_deposit,
        handlers::deposit::export_all_deposits,
    ),
    tags(
        (name = "Activities", description = "Course activity CRUD and classification"),
        (name = "Completion", description = "Completion marks and rates"),
        (name = "Deposits", description = "File deposits, grading, and archive export"),
    ),
    modifiers(&SecurityAddon),
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_default();
        components.add_security_scheme(
            "jwt",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allow_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
        .max_age(std::time::Duration::from_secs(config.max_age))
}

/// Build the application router.
pub fn build_router(state: AppState) -> axum::Router {
    let cors = cors_layer(&state.config.server.cors);
    let api = ApiDoc::openapi();

    axum::Router::new()
        .nest("/api", routes::api_routes())
        .with_state(state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api.clone()))
        .merge(Scalar::with_url("/scalar", api))
        .layer(cors)
}
