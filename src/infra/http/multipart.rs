//! Multipart form decoding for the document endpoints.

use axum::extract::Multipart;
use axum::extract::multipart::{Field, MultipartError};
use axum::http::StatusCode;
use bytes::Bytes;
use pagesmith_api_types::{
    AssemblyReference, CLIENT_VERSION_FIELD, FILE_FIELD, FILENAME_FIELD, FILES_FIELD,
    HANDOFF_FIELD, PAGES_FIELD, SLOT_FIELD_PREFIX, TARGET_FORMAT_FIELD, TOLERANT_FIELD,
};

use crate::application::assembly::{ReferenceMode, SlotReference, UploadSet};
use crate::application::error::AppError;
use crate::application::preview::{ImageFormat, PreviewRange};
use crate::domain::types::SlotId;

const FIRST_PAGE_FIELD: &str = "firstPage";
const LAST_PAGE_FIELD: &str = "lastPage";
const COUNT_ONLY_FIELD: &str = "countOnly";

#[derive(Debug)]
pub struct AssemblyForm {
    pub uploads: UploadSet,
    pub references: Vec<SlotReference>,
    pub mode: ReferenceMode,
    pub filename: Option<String>,
    pub client_version: Option<String>,
    pub handoff: bool,
}

#[derive(Debug)]
pub struct MergeForm {
    pub uploads: UploadSet,
    pub first_name: String,
}

#[derive(Debug)]
pub struct PreviewForm {
    pub document: Bytes,
    pub range: PreviewRange,
    pub count_only: bool,
}

#[derive(Debug)]
pub struct ConvertForm {
    pub document: Bytes,
    pub name: String,
    pub format: ImageFormat,
    pub client_version: Option<String>,
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("the upload exceeds the request size limit".to_string())
    } else {
        AppError::validation(format!("invalid multipart payload: {}", err.body_text()))
    }
}

async fn field_bytes(field: Field<'_>) -> Result<Bytes, AppError> {
    field.bytes().await.map_err(multipart_error)
}

async fn field_text(field: Field<'_>) -> Result<String, AppError> {
    field.text().await.map_err(multipart_error)
}

fn parse_flag(name: &str, raw: &str) -> Result<bool, AppError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "false" | "no" | "off" => Ok(false),
        "1" | "true" | "yes" | "on" => Ok(true),
        other => Err(AppError::validation(format!(
            "`{name}` must be a boolean, got `{other}`"
        ))),
    }
}

fn parse_image_format(raw: &str) -> Result<ImageFormat, AppError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "png" => Ok(ImageFormat::Png),
        "jpeg" | "jpg" => Ok(ImageFormat::Jpeg),
        other => Err(AppError::validation(format!(
            "`{TARGET_FORMAT_FIELD}` must be `png` or `jpeg`, got `{other}`"
        ))),
    }
}

fn parse_page_number(name: &str, raw: &str) -> Result<Option<u32>, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse()
        .map(Some)
        .map_err(|_| AppError::validation(format!("`{name}` must be a positive integer")))
}

fn non_blank(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn ensure_file_budget(uploads: &UploadSet, max_files: usize) -> Result<(), AppError> {
    if uploads.len() >= max_files {
        return Err(AppError::validation(format!(
            "at most {max_files} files can be uploaded per request"
        )));
    }
    Ok(())
}

fn parse_references(raw: &str) -> Result<Vec<SlotReference>, AppError> {
    let wire: Vec<AssemblyReference> = serde_json::from_str(raw)
        .map_err(|err| AppError::validation(format!("`{PAGES_FIELD}` is not valid JSON: {err}")))?;
    wire.into_iter()
        .map(|reference| -> Result<SlotReference, AppError> {
            Ok(SlotReference {
                slot: SlotId::parse(&reference.slot)?,
                page_index: reference.page_index,
            })
        })
        .collect()
}

pub async fn read_assembly_form(
    mut multipart: Multipart,
    max_files: usize,
) -> Result<AssemblyForm, AppError> {
    let mut uploads = UploadSet::new();
    let mut references = None;
    let mut mode = ReferenceMode::Strict;
    let mut filename = None;
    let mut client_version = None;
    let mut handoff = false;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        if let Some(raw_slot) = name.strip_prefix(SLOT_FIELD_PREFIX) {
            ensure_file_budget(&uploads, max_files)?;
            let slot = SlotId::parse(raw_slot)?;
            let display = field
                .file_name()
                .map(str::to_string)
                .unwrap_or_else(|| slot.to_string());
            let bytes = field_bytes(field).await?;
            uploads.insert(slot, display, bytes)?;
            continue;
        }

        match name.as_str() {
            PAGES_FIELD => references = Some(parse_references(&field_text(field).await?)?),
            TOLERANT_FIELD => {
                if parse_flag(TOLERANT_FIELD, &field_text(field).await?)? {
                    mode = ReferenceMode::Tolerant;
                }
            }
            FILENAME_FIELD => filename = non_blank(field_text(field).await?),
            CLIENT_VERSION_FIELD => client_version = non_blank(field_text(field).await?),
            HANDOFF_FIELD => handoff = parse_flag(HANDOFF_FIELD, &field_text(field).await?)?,
            _ => {}
        }
    }

    let references = references
        .ok_or_else(|| AppError::validation(format!("missing `{PAGES_FIELD}` field")))?;
    Ok(AssemblyForm {
        uploads,
        references,
        mode,
        filename,
        client_version,
        handoff,
    })
}

pub async fn read_merge_form(
    mut multipart: Multipart,
    max_files: usize,
) -> Result<MergeForm, AppError> {
    let mut uploads = UploadSet::new();
    let mut first_name = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILES_FIELD) {
            continue;
        }
        ensure_file_budget(&uploads, max_files)?;
        let position = uploads.len();
        let display = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("file-{}.pdf", position + 1));
        first_name.get_or_insert_with(|| display.clone());
        let slot = SlotId::parse(&format!("file-{position}"))?;
        uploads.insert(slot, display, field_bytes(field).await?)?;
    }

    Ok(MergeForm {
        uploads,
        first_name: first_name.unwrap_or_default(),
    })
}

pub async fn read_preview_form(mut multipart: Multipart) -> Result<PreviewForm, AppError> {
    let mut document = None;
    let mut range = PreviewRange::default();
    let mut count_only = false;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name() {
            Some(FILE_FIELD) => document = Some(field_bytes(field).await?),
            Some(FIRST_PAGE_FIELD) => {
                range.first_page = parse_page_number(FIRST_PAGE_FIELD, &field_text(field).await?)?;
            }
            Some(LAST_PAGE_FIELD) => {
                range.last_page = parse_page_number(LAST_PAGE_FIELD, &field_text(field).await?)?;
            }
            Some(COUNT_ONLY_FIELD) => {
                count_only = parse_flag(COUNT_ONLY_FIELD, &field_text(field).await?)?;
            }
            _ => {}
        }
    }

    let document =
        document.ok_or_else(|| AppError::validation(format!("missing `{FILE_FIELD}` field")))?;
    if document.is_empty() {
        return Err(AppError::validation("the uploaded file is empty"));
    }
    Ok(PreviewForm {
        document,
        range,
        count_only,
    })
}

pub async fn read_convert_form(mut multipart: Multipart) -> Result<ConvertForm, AppError> {
    let mut document = None;
    let mut format = ImageFormat::default();
    let mut client_version = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name() {
            Some(FILE_FIELD) => {
                let name = field
                    .file_name()
                    .and_then(|name| non_blank(name.to_string()))
                    .unwrap_or_else(|| "document.pdf".to_string());
                document = Some((name, field_bytes(field).await?));
            }
            Some(TARGET_FORMAT_FIELD) => format = parse_image_format(&field_text(field).await?)?,
            Some(CLIENT_VERSION_FIELD) => client_version = non_blank(field_text(field).await?),
            _ => {}
        }
    }

    let (name, document) =
        document.ok_or_else(|| AppError::validation(format!("missing `{FILE_FIELD}` field")))?;
    if document.is_empty() {
        return Err(AppError::validation("the uploaded file is empty"));
    }
    Ok(ConvertForm {
        document,
        name,
        format,
        client_version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_accept_common_spellings() {
        assert!(parse_flag("tolerant", "TRUE").expect("flag"));
        assert!(parse_flag("tolerant", "1").expect("flag"));
        assert!(!parse_flag("tolerant", "off").expect("flag"));
        assert!(parse_flag("tolerant", "maybe").is_err());
    }

    #[test]
    fn references_are_parsed_and_slots_validated() {
        let parsed = parse_references(r#"[{"slot":"a","pageIndex":2},{"slot":"b","pageIndex":0}]"#)
            .expect("references");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].slot.as_str(), "a");
        assert_eq!(parsed[0].page_index, 2);

        assert!(parse_references(r#"[{"slot":"../x","pageIndex":0}]"#).is_err());
        assert!(parse_references(r#"{"slot":"a"}"#).is_err());
    }

    #[test]
    fn page_numbers_must_be_integers() {
        assert_eq!(parse_page_number("firstPage", " 3 ").expect("page"), Some(3));
        assert_eq!(parse_page_number("firstPage", "").expect("page"), None);
        assert!(parse_page_number("firstPage", "-1").is_err());
    }

    #[test]
    fn image_formats_default_to_png() {
        assert_eq!(parse_image_format("").expect("format"), ImageFormat::Png);
        assert_eq!(parse_image_format("PNG").expect("format"), ImageFormat::Png);
        assert_eq!(parse_image_format(" jpg ").expect("format"), ImageFormat::Jpeg);
        assert_eq!(parse_image_format("jpeg").expect("format"), ImageFormat::Jpeg);
        assert!(parse_image_format("tiff").is_err());
    }
}
