pub mod api;
pub mod config;
pub mod infrastructure;
pub mod services;
pub mod utils;

use crate::config::UploadConfig;
use crate::services::progress::ProgressBroadcaster;
use crate::services::storage::ObjectStore;
use crate::services::upload::UploadCoordinator;
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::files::upload_file,
        api::handlers::files::delete_file,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            api::handlers::files::UploadResponse,
            api::handlers::files::DeleteRequest,
            api::handlers::files::DeleteResponse,
            api::handlers::health::HealthResponse,
        )
    ),
    tags(
        (name = "files", description = "Upload and delete objects"),
        (name = "system", description = "Service health")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ObjectStore>,
    pub coordinator: Arc<UploadCoordinator>,
    pub progress: ProgressBroadcaster,
    pub config: UploadConfig,
}

impl AppState {
    pub fn new(store: Arc<dyn ObjectStore>, config: UploadConfig) -> Self {
        let progress = ProgressBroadcaster::new();
        let coordinator = Arc::new(UploadCoordinator::new(
            store.clone(),
            progress.clone(),
            config.clone(),
        ));
        Self {
            store,
            coordinator,
            progress,
            config,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    let body_limit = state.config.max_file_size;
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route(
            "/api/files",
            post(api::handlers::files::upload_file).delete(api::handlers::files::delete_file),
        )
        .route(
            "/api/files/progress/:session_id",
            get(api::handlers::files::progress_events),
        )
        .route("/health", get(api::handlers::health::health_check))
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
