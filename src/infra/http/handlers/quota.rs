use axum::Json;
use axum::extract::{Extension, State};
use pagesmith_api_types::{QuotaStatus, QuotaSyncRequest};

use crate::application::error::AppError;
use crate::domain::quota::Identity;
use crate::infra::http::state::AppState;

pub async fn quota_status(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<QuotaStatus>, AppError> {
    Ok(Json(state.quota.status(&identity).await?))
}

/// Called by clients after sign-in or sign-out; responds with the status of
/// the current identity. The previous anonymous counter is dropped only when
/// the caller is authenticated, so an anonymous caller naming someone else's
/// client id changes nothing.
pub async fn sync_quota(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<QuotaSyncRequest>,
) -> Result<Json<QuotaStatus>, AppError> {
    let previous = previous_identity(request);
    let status = state
        .quota
        .sync_identity(previous.as_ref(), &identity)
        .await?;
    Ok(Json(status))
}

fn previous_identity(request: QuotaSyncRequest) -> Option<Identity> {
    let non_blank = |value: Option<String>| {
        value
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };
    non_blank(request.previous_user)
        .map(Identity::Authenticated)
        .or_else(|| non_blank(request.previous_client_id).map(Identity::Anonymous))
}
