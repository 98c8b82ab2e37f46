use std::time::Instant;

use axum::extract::{Extension, Multipart, State};
use axum::response::Response;
use metrics::counter;
use tracing::{error, info};

use crate::application::assembly::{AssembledDocument, AssemblyRequest};
use crate::application::error::AppError;
use crate::application::quota::Admission;
use crate::application::transfer::TransferPayload;
use crate::application::usage::{Operation, UsageEvent};
use crate::domain::quota::Identity;
use crate::infra::http::multipart::{read_assembly_form, read_merge_form};
use crate::infra::http::state::AppState;
use crate::infra::telemetry::METRIC_QUOTA_REJECTED_TOTAL;
use crate::util::disposition::{file_stem, sanitize_filename};

use super::{DownloadHeaders, pdf_response};

const TARGET: &str = "pagesmith::http::assemble";
const DEFAULT_FILENAME: &str = "edited.pdf";

pub(super) async fn admit(state: &AppState, identity: &Identity) -> Result<Admission, AppError> {
    let admission = state.quota.admit(identity).await?;
    admission.into_result().inspect_err(|_| {
        counter!(
            METRIC_QUOTA_REJECTED_TOTAL,
            "identity_class" => identity_label(identity)
        )
        .increment(1);
    })
}

fn identity_label(identity: &Identity) -> &'static str {
    match identity {
        Identity::Anonymous(_) => "anonymous",
        Identity::Authenticated(_) => "authenticated",
    }
}

/// Count the finished document. Store failures are logged and the document is
/// still served.
pub(super) async fn commit(
    state: &AppState,
    identity: &Identity,
    admission: Admission,
) -> (u32, u32) {
    match state.quota.commit(identity).await {
        Ok(record) => (record.limit, record.remaining()),
        Err(err) => {
            error!(
                target = TARGET,
                identity = %identity.key(),
                error = %err,
                "failed to commit quota after a successful document"
            );
            (admission.limit, admission.remaining.saturating_sub(1))
        }
    }
}

pub(super) struct Produced<'a> {
    pub operation: Operation,
    pub identity: &'a Identity,
    pub file_count: usize,
    pub input_bytes: u64,
    pub client_version: Option<String>,
    pub started_at: Instant,
}

/// Output size and page count of whatever the request produced.
pub(super) fn emit_usage(
    state: &AppState,
    produced: Produced<'_>,
    output_bytes: usize,
    page_count: usize,
) {
    state.usage.emit(UsageEvent {
        operation: produced.operation,
        file_count: produced.file_count,
        input_bytes: produced.input_bytes,
        output_bytes: output_bytes as u64,
        page_count,
        elapsed_ms: produced.started_at.elapsed().as_millis() as u64,
        identity_class: produced.identity.class(),
        client_version: produced.client_version,
    });
}

pub async fn assemble_document(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let started_at = Instant::now();
    let admission = admit(&state, &identity).await?;

    let form = read_assembly_form(multipart, state.limits.max_files).await?;
    let filename = sanitize_filename(
        form.filename.as_deref().unwrap_or(""),
        DEFAULT_FILENAME,
        "pdf",
    );
    let file_count = form.uploads.len();
    let input_bytes = form.uploads.total_bytes();

    let document = state
        .assembler
        .assemble(AssemblyRequest {
            references: form.references,
            uploads: form.uploads,
            mode: form.mode,
        })
        .await?;

    let quota = commit(&state, &identity, admission).await;
    emit_usage(
        &state,
        Produced {
            operation: Operation::Assemble,
            identity: &identity,
            file_count,
            input_bytes,
            client_version: form.client_version,
            started_at,
        },
        document.bytes.len(),
        document.page_count,
    );

    let AssembledDocument {
        bytes,
        page_count,
        skipped,
    } = document;
    let transfer_token = form.handoff.then(|| {
        state.transfers.deposit(TransferPayload {
            filename: filename.clone(),
            bytes: bytes.clone(),
            page_count,
        })
    });

    info!(
        target = TARGET,
        identity = %identity.key(),
        pages = page_count,
        skipped = skipped.len(),
        handoff = transfer_token.is_some(),
        "document assembled"
    );
    Ok(pdf_response(
        &filename,
        bytes,
        page_count,
        DownloadHeaders {
            quota: Some(quota),
            transfer_token,
        },
    ))
}

pub async fn merge_documents(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let started_at = Instant::now();
    let admission = admit(&state, &identity).await?;

    let form = read_merge_form(multipart, state.limits.max_files).await?;
    let filename = sanitize_filename(
        &format!("merged-{}.pdf", file_stem(&form.first_name)),
        DEFAULT_FILENAME,
        "pdf",
    );
    let document = state.assembler.merge(&form.uploads).await?;

    let quota = commit(&state, &identity, admission).await;
    emit_usage(
        &state,
        Produced {
            operation: Operation::Merge,
            identity: &identity,
            file_count: form.uploads.len(),
            input_bytes: form.uploads.total_bytes(),
            client_version: None,
            started_at,
        },
        document.bytes.len(),
        document.page_count,
    );

    Ok(pdf_response(
        &filename,
        document.bytes,
        document.page_count,
        DownloadHeaders {
            quota: Some(quota),
            transfer_token: None,
        },
    ))
}
