mod handlers;
mod middleware;
mod multipart;
mod state;

pub use middleware::{IdentityResolver, RequestContext};
pub use state::{AppState, UploadLimits};

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware as axum_middleware;
use axum::routing::{get, post};

use middleware::{log_responses, resolve_identity, set_request_context};

/// All routes under `/api/v1`. Requests pass the request id, identity and
/// logging layers in that order before reaching a handler.
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.limits.max_request_bytes;
    let resolver = state.identity.clone();
    let api = Router::new()
        .route("/assemble", post(handlers::assemble_document))
        .route("/merge", post(handlers::merge_documents))
        .route("/preview", post(handlers::preview_document))
        .route("/convert", post(handlers::convert_document))
        .route("/quota", get(handlers::quota_status))
        .route("/quota/sync", post(handlers::sync_quota))
        .route("/transfers/{token}", post(handlers::take_transfer))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(body_limit));

    Router::new()
        .nest("/api/v1", api)
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn_with_state(
            resolver,
            resolve_identity,
        ))
        .layer(axum_middleware::from_fn(set_request_context))
}
