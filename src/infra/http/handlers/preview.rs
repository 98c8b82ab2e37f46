use axum::Json;
use axum::extract::{Multipart, State};
use pagesmith_api_types::PreviewResponse;

use crate::application::error::AppError;
use crate::infra::http::multipart::read_preview_form;
use crate::infra::http::state::AppState;

pub async fn preview_document(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<PreviewResponse>, AppError> {
    let form = read_preview_form(multipart).await?;
    let response = state
        .previews
        .fetch(form.document, form.range, form.count_only)
        .await?;
    Ok(Json(response))
}
