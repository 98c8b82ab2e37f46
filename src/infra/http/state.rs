use crate::application::assembly::DocumentAssembler;
use crate::application::convert::RasterExporter;
use crate::application::preview::PreviewFetcher;
use crate::application::quota::QuotaGate;
use crate::application::transfer::TransferMailbox;
use crate::application::usage::UsageRecorder;
use crate::infra::db::PostgresRepositories;
use crate::infra::pdf::LopdfLibrary;

use super::middleware::IdentityResolver;

#[derive(Debug, Clone, Copy)]
pub struct UploadLimits {
    pub max_request_bytes: usize,
    pub max_files: usize,
}

/// Shared handles for every route.
#[derive(Clone)]
pub struct AppState {
    pub assembler: DocumentAssembler<LopdfLibrary>,
    pub previews: PreviewFetcher<LopdfLibrary>,
    pub exporter: RasterExporter<LopdfLibrary>,
    pub quota: QuotaGate,
    pub usage: UsageRecorder,
    pub transfers: TransferMailbox,
    pub identity: IdentityResolver,
    pub limits: UploadLimits,
    /// Absent when running without a database.
    pub db: Option<PostgresRepositories>,
}
