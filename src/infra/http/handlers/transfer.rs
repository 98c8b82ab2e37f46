use axum::extract::{Path, State};
use axum::response::Response;

use crate::application::error::AppError;
use crate::infra::http::state::AppState;

use super::{DownloadHeaders, pdf_response};

pub async fn take_transfer(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Response, AppError> {
    let payload = state.transfers.take(&token).ok_or(AppError::NotFound)?;
    Ok(pdf_response(
        &payload.filename,
        payload.bytes,
        payload.page_count,
        DownloadHeaders::default(),
    ))
}
