use std::time::Instant;

use axum::extract::{Extension, Multipart, State};
use axum::response::Response;
use tracing::info;

use crate::application::error::AppError;
use crate::application::usage::Operation;
use crate::domain::quota::Identity;
use crate::infra::http::multipart::read_convert_form;
use crate::infra::http::state::AppState;
use crate::util::disposition::{file_stem, sanitize_filename};

use super::assemble::{Produced, admit, commit, emit_usage};
use super::{DownloadHeaders, zip_response};

const TARGET: &str = "pagesmith::http::convert";
const DEFAULT_FILENAME: &str = "converted.zip";

/// Render every page of the upload and return the images as a zip archive.
pub async fn convert_document(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let started_at = Instant::now();
    let admission = admit(&state, &identity).await?;

    let form = read_convert_form(multipart).await?;
    let filename = sanitize_filename(
        &format!("converted-{}.zip", file_stem(&form.name)),
        DEFAULT_FILENAME,
        "zip",
    );
    let input_bytes = form.document.len() as u64;
    let archive = state.exporter.export(form.document, form.format).await?;

    let quota = commit(&state, &identity, admission).await;
    emit_usage(
        &state,
        Produced {
            operation: Operation::Convert,
            identity: &identity,
            file_count: 1,
            input_bytes,
            client_version: form.client_version,
            started_at,
        },
        archive.bytes.len(),
        archive.page_count,
    );

    info!(
        target = TARGET,
        identity = %identity.key(),
        pages = archive.page_count,
        format = form.format.extension(),
        "document converted"
    );
    Ok(zip_response(
        &filename,
        archive.bytes,
        archive.page_count,
        DownloadHeaders {
            quota: Some(quota),
            transfer_token: None,
        },
    ))
}
