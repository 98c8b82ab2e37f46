//! Wire types shared by the pagesmith server and its command-line client.

use serde::{Deserialize, Serialize};

/// Multipart field carrying the ordered reference list as JSON.
pub const PAGES_FIELD: &str = "pages";
/// Prefix of multipart file fields; the remainder of the field name is the slot.
pub const SLOT_FIELD_PREFIX: &str = "slot:";
/// Multipart text field opting into tolerant reference resolution.
pub const TOLERANT_FIELD: &str = "tolerant";
/// Multipart text field naming the output document.
pub const FILENAME_FIELD: &str = "filename";
/// Multipart text field carrying the client build identifier for usage logs.
pub const CLIENT_VERSION_FIELD: &str = "clientVersion";
/// Multipart text field asking the server to keep the output for a one-shot transfer.
pub const HANDOFF_FIELD: &str = "handoff";
/// Multipart file field used by the merge endpoint.
pub const FILES_FIELD: &str = "files";
/// Multipart file field used by the preview and convert endpoints.
pub const FILE_FIELD: &str = "file";
/// Multipart text field choosing the raster export encoding (`png` or `jpeg`).
pub const TARGET_FORMAT_FIELD: &str = "targetFormat";

pub const HEADER_PAGE_COUNT: &str = "x-page-count";
pub const HEADER_QUOTA_LIMIT: &str = "x-quota-limit";
pub const HEADER_QUOTA_REMAINING: &str = "x-quota-remaining";
pub const HEADER_TRANSFER_TOKEN: &str = "x-transfer-token";

/// One entry of the ordered reference list: a page of the upload in `slot`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssemblyReference {
    pub slot: String,
    pub page_index: u32,
}

/// Body of every failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Body of a request rejected by the daily quota.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaExceededBody {
    pub error: String,
    pub remaining: u32,
    pub retry_after_seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityClass {
    Anonymous,
    Authenticated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaState {
    Fresh,
    WithinLimit,
    Exhausted,
}

/// Snapshot of the authoritative counter for the calling identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaStatus {
    pub identity_class: IdentityClass,
    pub state: QuotaState,
    /// Calendar date of the current window, `YYYY-MM-DD` in the reference timezone.
    pub window_date: String,
    pub used: u32,
    pub limit: u32,
    pub remaining: u32,
    pub retry_after_seconds: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaSyncRequest {
    /// Anonymous client key used before the identity changed, if any.
    #[serde(default)]
    pub previous_client_id: Option<String>,
    /// Authenticated user before the identity changed, if any.
    #[serde(default)]
    pub previous_user: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    pub total_pages: u32,
    pub previews: Vec<String>,
}
