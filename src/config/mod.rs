//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

pub use cli::{CliArgs, Command, DatabaseOverride, MigrateArgs, ServeArgs, ServeOverrides};

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroU64},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use axum::http::HeaderName;
use chrono_tz::Tz;
use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::domain::quota::QuotaLimits;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "pagesmith";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_UPLOAD_REQUEST_LIMIT_BYTES: u64 = 100 * 1024 * 1024;
const DEFAULT_UPLOAD_MAX_FILES: u32 = 20;
const DEFAULT_QUOTA_TIMEZONE: &str = "Asia/Seoul";
const DEFAULT_ANONYMOUS_LIMIT: u32 = 300;
const DEFAULT_AUTHENTICATED_LIMIT: u32 = 100;
const DEFAULT_USER_HEADER: &str = "x-authenticated-user";
const DEFAULT_CLIENT_HEADER: &str = "x-client-id";
const DEFAULT_GHOSTSCRIPT_PATH: &str = "gs";
const DEFAULT_PREVIEW_DEVICE: &str = "pngalpha";
const DEFAULT_PREVIEW_DPI: u32 = 150;
const DEFAULT_PREVIEW_MAX_PAGES: u32 = 50;
const DEFAULT_EXPORT_MAX_PAGES: u32 = 500;
const DEFAULT_TRANSFER_TTL_SECS: u64 = 600;
const DEFAULT_TRANSFER_MAX_ENTRIES: u32 = 64;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub uploads: UploadSettings,
    pub quota: QuotaSettings,
    pub identity: IdentitySettings,
    pub preview: PreviewSettings,
    pub transfer: TransferSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    /// Without a URL, authenticated quotas live in memory and usage is not persisted.
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub max_request_bytes: NonZeroU64,
    pub max_files: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct QuotaSettings {
    pub timezone: Tz,
    pub limits: QuotaLimits,
}

#[derive(Debug, Clone)]
pub struct IdentitySettings {
    pub user_header: HeaderName,
    pub client_header: HeaderName,
}

#[derive(Debug, Clone)]
pub struct PreviewSettings {
    pub ghostscript_path: PathBuf,
    pub device: String,
    pub dpi: NonZeroU32,
    pub max_pages: NonZeroU32,
    /// Upper bound on pages rendered into one raster export archive.
    pub export_max_pages: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct TransferSettings {
    pub ttl: Duration,
    pub max_entries: NonZeroU32,
}

impl Settings {
    /// Settings built from built-in defaults only, ignoring files and environment.
    pub fn from_defaults() -> Result<Self, LoadError> {
        Self::from_raw(RawSettings::default())
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("PAGESMITH").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Migrate(args)) => raw.apply_database_override(&args.database),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    uploads: RawUploadSettings,
    quota: RawQuotaSettings,
    identity: RawIdentitySettings,
    preview: RawPreviewSettings,
    transfer: RawTransferSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        self.apply_database_override(&overrides.database);
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(limit) = overrides.uploads_max_request_bytes {
            self.uploads.max_request_bytes = Some(limit);
        }
        if let Some(max) = overrides.uploads_max_files {
            self.uploads.max_files = Some(max);
        }
        if let Some(limit) = overrides.quota_anonymous_limit {
            self.quota.anonymous_limit = Some(limit);
        }
        if let Some(limit) = overrides.quota_authenticated_limit {
            self.quota.authenticated_limit = Some(limit);
        }
        if let Some(timezone) = overrides.quota_timezone.as_ref() {
            self.quota.timezone = Some(timezone.clone());
        }
        if let Some(path) = overrides.preview_ghostscript_path.as_ref() {
            self.preview.ghostscript_path = Some(path.clone());
        }
        if let Some(dpi) = overrides.preview_dpi {
            self.preview.dpi = Some(dpi);
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            uploads,
            quota,
            identity,
            preview,
            transfer,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            uploads: build_upload_settings(uploads)?,
            quota: build_quota_settings(quota)?,
            identity: build_identity_settings(identity)?,
            preview: build_preview_settings(preview)?,
            transfer: build_transfer_settings(transfer)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }
    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });
    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_upload_settings(uploads: RawUploadSettings) -> Result<UploadSettings, LoadError> {
    let max_request_bytes_value = uploads
        .max_request_bytes
        .unwrap_or(DEFAULT_UPLOAD_REQUEST_LIMIT_BYTES);
    let max_request_bytes = NonZeroU64::new(max_request_bytes_value).ok_or_else(|| {
        LoadError::invalid("uploads.max_request_bytes", "must be greater than zero")
    })?;
    usize::try_from(max_request_bytes_value).map_err(|_| {
        LoadError::invalid(
            "uploads.max_request_bytes",
            "value exceeds supported range for usize",
        )
    })?;
    let max_files = non_zero_u32(
        uploads.max_files.unwrap_or(DEFAULT_UPLOAD_MAX_FILES).into(),
        "uploads.max_files",
    )?;

    Ok(UploadSettings {
        max_request_bytes,
        max_files,
    })
}

fn build_quota_settings(quota: RawQuotaSettings) -> Result<QuotaSettings, LoadError> {
    let timezone_name = quota
        .timezone
        .unwrap_or_else(|| DEFAULT_QUOTA_TIMEZONE.to_string());
    let timezone = Tz::from_str(timezone_name.trim()).map_err(|err| {
        LoadError::invalid("quota.timezone", format!("unknown timezone: {err}"))
    })?;

    let anonymous = non_zero_u32(
        quota.anonymous_limit.unwrap_or(DEFAULT_ANONYMOUS_LIMIT).into(),
        "quota.anonymous_limit",
    )?;
    let authenticated = non_zero_u32(
        quota
            .authenticated_limit
            .unwrap_or(DEFAULT_AUTHENTICATED_LIMIT)
            .into(),
        "quota.authenticated_limit",
    )?;
    if anonymous < authenticated {
        return Err(LoadError::invalid(
            "quota.anonymous_limit",
            "must not be lower than quota.authenticated_limit",
        ));
    }

    Ok(QuotaSettings {
        timezone,
        limits: QuotaLimits {
            anonymous,
            authenticated,
        },
    })
}

fn build_identity_settings(identity: RawIdentitySettings) -> Result<IdentitySettings, LoadError> {
    let parse = |value: Option<String>, default: &str, key: &'static str| {
        let name = value.unwrap_or_else(|| default.to_string());
        HeaderName::from_str(name.trim())
            .map_err(|err| LoadError::invalid(key, format!("invalid header name: {err}")))
    };
    let user_header = parse(identity.user_header, DEFAULT_USER_HEADER, "identity.user_header")?;
    let client_header = parse(
        identity.client_header,
        DEFAULT_CLIENT_HEADER,
        "identity.client_header",
    )?;
    if user_header == client_header {
        return Err(LoadError::invalid(
            "identity.client_header",
            "must differ from identity.user_header",
        ));
    }

    Ok(IdentitySettings {
        user_header,
        client_header,
    })
}

fn build_preview_settings(preview: RawPreviewSettings) -> Result<PreviewSettings, LoadError> {
    let ghostscript_path = preview
        .ghostscript_path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_GHOSTSCRIPT_PATH));
    if ghostscript_path.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "preview.ghostscript_path",
            "path must not be empty",
        ));
    }

    let device = preview
        .device
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| DEFAULT_PREVIEW_DEVICE.to_string());
    if device.is_empty() || !device.chars().all(|ch| ch.is_ascii_alphanumeric()) {
        return Err(LoadError::invalid(
            "preview.device",
            "must be a Ghostscript device name",
        ));
    }

    Ok(PreviewSettings {
        ghostscript_path,
        device,
        dpi: non_zero_u32(
            preview.dpi.unwrap_or(DEFAULT_PREVIEW_DPI).into(),
            "preview.dpi",
        )?,
        max_pages: non_zero_u32(
            preview.max_pages.unwrap_or(DEFAULT_PREVIEW_MAX_PAGES).into(),
            "preview.max_pages",
        )?,
        export_max_pages: non_zero_u32(
            preview
                .export_max_pages
                .unwrap_or(DEFAULT_EXPORT_MAX_PAGES)
                .into(),
            "preview.export_max_pages",
        )?,
    })
}

fn build_transfer_settings(transfer: RawTransferSettings) -> Result<TransferSettings, LoadError> {
    let ttl_seconds = transfer.ttl_seconds.unwrap_or(DEFAULT_TRANSFER_TTL_SECS);
    if ttl_seconds == 0 {
        return Err(LoadError::invalid(
            "transfer.ttl_seconds",
            "must be greater than zero",
        ));
    }

    Ok(TransferSettings {
        ttl: Duration::from_secs(ttl_seconds),
        max_entries: non_zero_u32(
            transfer
                .max_entries
                .unwrap_or(DEFAULT_TRANSFER_MAX_ENTRIES)
                .into(),
            "transfer.max_entries",
        )?,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawUploadSettings {
    max_request_bytes: Option<u64>,
    max_files: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawQuotaSettings {
    timezone: Option<String>,
    anonymous_limit: Option<u32>,
    authenticated_limit: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawIdentitySettings {
    user_header: Option<String>,
    client_header: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPreviewSettings {
    ghostscript_path: Option<PathBuf>,
    device: Option<String>,
    dpi: Option<u32>,
    max_pages: Option<u32>,
    export_max_pages: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawTransferSettings {
    ttl_seconds: Option<u64>,
    max_entries: Option<u32>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[cfg(test)]
mod tests;
