use pagesmith_api_types::{
    ErrorBody, HEADER_PAGE_COUNT, HEADER_TRANSFER_TOKEN, QuotaExceededBody,
};
use percent_encoding::percent_decode_str;
use reqwest::header::{CONTENT_DISPOSITION, HeaderMap};
use reqwest::multipart::Form;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::session::{QuotaReplica, Session};

pub const USER_HEADER: &str = "x-authenticated-user";
pub const CLIENT_HEADER: &str = "x-client-id";

#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to read input file {path}: {source}")]
    InputFile {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    OutputFile {
        path: String,
        source: std::io::Error,
    },
    #[error("session file error: {0}")]
    Session(String),
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("daily limit reached; try again in {retry_after_seconds} seconds")]
    QuotaExceeded { retry_after_seconds: u64 },
    #[error("server error: {0}")]
    Server(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// A document or archive returned by the server, with the metadata carried in its headers.
#[derive(Debug)]
pub struct Download {
    pub bytes: Vec<u8>,
    pub filename: Option<String>,
    pub page_count: Option<usize>,
    pub transfer_token: Option<String>,
    pub quota: Option<QuotaReplica>,
}

#[derive(Clone, Debug)]
pub struct Ctx {
    pub client: Client,
    pub base: Url,
}

impl Ctx {
    pub fn new(server: &str) -> Result<Self, CliError> {
        let base = Url::parse(server)?.join("/")?;
        let client = Client::builder().user_agent(Self::user_agent()).build()?;
        Ok(Self { client, base })
    }

    pub fn user_agent() -> &'static str {
        concat!("pagesmith-cli/", env!("CARGO_PKG_VERSION"))
    }

    pub fn url(&self, path: &str) -> Result<Url, CliError> {
        self.base.join(path).map_err(CliError::Url)
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        session: &Session,
    ) -> Result<RequestBuilder, CliError> {
        let mut req = self
            .client
            .request(method, self.url(path)?)
            .header(CLIENT_HEADER, &session.client_id);
        if let Some(user) = &session.user {
            req = req.header(USER_HEADER, user);
        }
        Ok(req)
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        session: &Session,
    ) -> Result<T, CliError> {
        let resp = self.request(Method::GET, path, session)?.send().await?;
        Self::json(resp).await
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        session: &Session,
        body: &B,
    ) -> Result<T, CliError> {
        let resp = self
            .request(Method::POST, path, session)?
            .json(body)
            .send()
            .await?;
        Self::json(resp).await
    }

    pub async fn post_form_json<T: DeserializeOwned>(
        &self,
        path: &str,
        session: &Session,
        form: Form,
    ) -> Result<T, CliError> {
        let resp = self
            .request(Method::POST, path, session)?
            .multipart(form)
            .send()
            .await?;
        Self::json(resp).await
    }

    pub async fn post_form_download(
        &self,
        path: &str,
        session: &Session,
        form: Form,
    ) -> Result<Download, CliError> {
        let resp = self
            .request(Method::POST, path, session)?
            .multipart(form)
            .send()
            .await?;
        Self::download(resp).await
    }

    pub async fn post_download(&self, path: &str, session: &Session) -> Result<Download, CliError> {
        let resp = self.request(Method::POST, path, session)?.send().await?;
        Self::download(resp).await
    }

    async fn json<T: DeserializeOwned>(resp: Response) -> Result<T, CliError> {
        let resp = Self::check(resp).await?;
        let bytes = resp.bytes().await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| CliError::Server(format!("failed to parse body: {e}")))
    }

    async fn download(resp: Response) -> Result<Download, CliError> {
        let resp = Self::check(resp).await?;
        let headers = resp.headers().clone();
        let bytes = resp.bytes().await?.to_vec();
        Ok(Download {
            bytes,
            filename: headers
                .get(CONTENT_DISPOSITION)
                .and_then(|value| value.to_str().ok())
                .and_then(disposition_filename),
            page_count: header_str(&headers, HEADER_PAGE_COUNT).and_then(|v| v.parse().ok()),
            transfer_token: header_str(&headers, HEADER_TRANSFER_TOKEN).map(str::to_string),
            quota: QuotaReplica::from_headers(&headers),
        })
    }

    async fn check(resp: Response) -> Result<Response, CliError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let bytes = resp.bytes().await?;
        if status == StatusCode::TOO_MANY_REQUESTS
            && let Ok(body) = serde_json::from_slice::<QuotaExceededBody>(&bytes)
        {
            return Err(CliError::QuotaExceeded {
                retry_after_seconds: body.retry_after_seconds,
            });
        }
        let message = serde_json::from_slice::<ErrorBody>(&bytes)
            .map(|body| body.error)
            .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).into_owned());
        Err(CliError::Server(format!("status {status}: {message}")))
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Prefer the UTF-8 `filename*` parameter over the ASCII fallback.
pub fn disposition_filename(value: &str) -> Option<String> {
    let mut fallback = None;
    for param in value.split(';').map(str::trim) {
        if let Some(encoded) = param.strip_prefix("filename*=UTF-8''") {
            if let Ok(decoded) = percent_decode_str(encoded).decode_utf8() {
                return Some(decoded.into_owned());
            }
        } else if let Some(quoted) = param.strip_prefix("filename=") {
            fallback = Some(quoted.trim_matches('"').to_string());
        }
    }
    fallback
}
