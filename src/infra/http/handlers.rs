//! Route handlers for the document API.

mod assemble;
mod convert;
mod health;
mod preview;
mod quota;
mod transfer;

pub use assemble::{assemble_document, merge_documents};
pub use convert::convert_document;
pub use health::health;
pub use preview::preview_document;
pub use quota::{quota_status, sync_quota};
pub use transfer::take_transfer;

use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use pagesmith_api_types::{
    HEADER_PAGE_COUNT, HEADER_QUOTA_LIMIT, HEADER_QUOTA_REMAINING, HEADER_TRANSFER_TOKEN,
};

use crate::util::disposition;

/// Extra headers attached to a document download.
#[derive(Debug, Default)]
pub(crate) struct DownloadHeaders {
    pub quota: Option<(u32, u32)>,
    pub transfer_token: Option<String>,
}

pub(crate) fn pdf_response(
    filename: &str,
    bytes: Vec<u8>,
    page_count: usize,
    extra: DownloadHeaders,
) -> Response {
    download_response("application/pdf", filename, bytes, page_count, extra)
}

pub(crate) fn zip_response(
    filename: &str,
    bytes: Vec<u8>,
    page_count: usize,
    extra: DownloadHeaders,
) -> Response {
    download_response("application/zip", filename, bytes, page_count, extra)
}

fn download_response(
    content_type: &'static str,
    filename: &str,
    bytes: Vec<u8>,
    page_count: usize,
    extra: DownloadHeaders,
) -> Response {
    let mut response = (StatusCode::OK, bytes).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    if let Ok(value) = HeaderValue::from_str(&disposition::attachment(filename)) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    headers.insert(
        HeaderName::from_static(HEADER_PAGE_COUNT),
        HeaderValue::from(page_count),
    );
    if let Some((limit, remaining)) = extra.quota {
        headers.insert(
            HeaderName::from_static(HEADER_QUOTA_LIMIT),
            HeaderValue::from(limit),
        );
        headers.insert(
            HeaderName::from_static(HEADER_QUOTA_REMAINING),
            HeaderValue::from(remaining),
        );
    }
    if let Some(token) = extra.transfer_token
        && let Ok(value) = HeaderValue::from_str(&token)
    {
        headers.insert(HeaderName::from_static(HEADER_TRANSFER_TOKEN), value);
    }
    response
}
