#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{HeaderName, Method, Request, Response},
};
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use lopdf::{Document, Object, Stream, dictionary};
use pagesmith::application::assembly::DocumentAssembler;
use pagesmith::application::convert::RasterExporter;
use pagesmith::application::preview::{ImageFormat, PreviewFetcher, RasterError, Rasterizer};
use pagesmith::application::quota::{ManualClock, MemoryQuotaStore, QuotaGate};
use pagesmith::application::transfer::TransferMailbox;
use pagesmith::application::usage::{UsageRecorder, UsageSink};
use pagesmith::domain::quota::{QuotaLimits, QuotaWindow};
use pagesmith::infra::http::{AppState, IdentityResolver, UploadLimits, build_router};
use pagesmith::infra::pdf::LopdfLibrary;
use tower::ServiceExt;

pub const BOUNDARY: &str = "pagesmith-test-boundary";
pub const CLIENT_HEADER: &str = "x-client-id";
pub const USER_HEADER: &str = "x-authenticated-user";

/// Uncompressed PDF with one page per label; each page draws its label.
pub fn pdf_with_pages(labels: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let mut kids = Vec::new();
    for label in labels {
        let content = format!("BT /F1 18 Tf 72 720 Td ({label}) Tj ET").into_bytes();
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        });
        kids.push(page_id.into());
    }
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => labels.len() as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("save test pdf");
    bytes
}

/// Label drawn on each page of `bytes`, in page order.
pub fn page_labels(bytes: &[u8]) -> Vec<String> {
    let doc = Document::load_mem(bytes).expect("load output pdf");
    doc.get_pages()
        .values()
        .map(|page_id| {
            let content = doc.get_page_content(*page_id).expect("page content");
            let text = String::from_utf8_lossy(&content).to_string();
            let start = text.find('(').map(|i| i + 1).unwrap_or(0);
            let end = text.rfind(')').unwrap_or(text.len());
            text[start..end].to_string()
        })
        .collect()
}

/// Hand-built `multipart/form-data` body.
#[derive(Default)]
pub struct Form {
    body: Vec<u8>,
}

impl Form {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, filename: &str, bytes: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: application/pdf\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        self.body
    }
}

pub fn multipart_request(uri: &str, client: &str, form: Form) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(CLIENT_HEADER, client)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(form.finish()))
        .expect("request should build")
}

pub fn references(pairs: &[(&str, u32)]) -> String {
    let entries: Vec<String> = pairs
        .iter()
        .map(|(slot, page)| format!(r#"{{"slot":"{slot}","pageIndex":{page}}}"#))
        .collect();
    format!("[{}]", entries.join(","))
}

pub async fn body_bytes(response: Response<Body>) -> Bytes {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body")
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone()
        .oneshot(request)
        .await
        .expect("router should respond")
}

pub fn header<'a>(response: &'a Response<Body>, name: &str) -> Option<&'a str> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
}

/// Returns one placeholder image per requested page, e.g. `png-3` or `jpg-3`.
pub struct StubRasterizer;

#[async_trait]
impl Rasterizer for StubRasterizer {
    async fn rasterize(
        &self,
        _document: Bytes,
        first_page: u32,
        last_page: u32,
        format: ImageFormat,
    ) -> Result<Vec<Vec<u8>>, RasterError> {
        Ok((first_page..=last_page)
            .map(|page| format!("{}-{page}", format.extension()).into_bytes())
            .collect())
    }
}

pub struct Harness {
    pub state: AppState,
    pub clock: Arc<ManualClock>,
    pub local: MemoryQuotaStore,
    pub remote: MemoryQuotaStore,
}

impl Harness {
    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }
}

pub fn harness(anonymous: u32, authenticated: u32, sinks: Vec<Arc<dyn UsageSink>>) -> Harness {
    let library = Arc::new(LopdfLibrary::new());
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 3, 2, 1, 0, 0)
            .single()
            .expect("start time"),
    ));
    let local = MemoryQuotaStore::new();
    let remote = MemoryQuotaStore::new();
    let limits = QuotaLimits {
        anonymous: anonymous.try_into().expect("non-zero limit"),
        authenticated: authenticated.try_into().expect("non-zero limit"),
    };
    let quota = QuotaGate::new(
        QuotaWindow::new(chrono_tz::Asia::Seoul),
        limits,
        Arc::new(local.clone()),
        Arc::new(remote.clone()),
        clock.clone(),
    );

    let state = AppState {
        assembler: DocumentAssembler::new(Arc::clone(&library)),
        exporter: RasterExporter::new(Arc::clone(&library), Arc::new(StubRasterizer), 20),
        previews: PreviewFetcher::new(library, Arc::new(StubRasterizer), 5),
        quota,
        usage: UsageRecorder::new(sinks),
        transfers: TransferMailbox::new(Duration::from_secs(60), 8),
        identity: IdentityResolver::new(
            HeaderName::from_static(USER_HEADER),
            HeaderName::from_static(CLIENT_HEADER),
        ),
        limits: UploadLimits {
            max_request_bytes: 4 * 1024 * 1024,
            max_files: 4,
        },
        db: None,
    };
    Harness {
        state,
        clock,
        local,
        remote,
    }
}
