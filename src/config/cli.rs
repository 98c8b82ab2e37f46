use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the pagesmith server.
#[derive(Debug, Parser)]
#[command(name = "pagesmith", version, about = "PDF page assembly server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "PAGESMITH_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP API.
    Serve(Box<ServeArgs>),
    /// Apply pending database migrations and exit.
    Migrate(MigrateArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the maximum request size for uploads in bytes.
    #[arg(long = "uploads-max-request-bytes", value_name = "BYTES")]
    pub uploads_max_request_bytes: Option<u64>,

    /// Override the maximum number of files per request.
    #[arg(long = "uploads-max-files", value_name = "COUNT")]
    pub uploads_max_files: Option<u32>,

    /// Override the daily limit for anonymous clients.
    #[arg(long = "quota-anonymous-limit", value_name = "COUNT")]
    pub quota_anonymous_limit: Option<u32>,

    /// Override the daily limit for signed-in users.
    #[arg(long = "quota-authenticated-limit", value_name = "COUNT")]
    pub quota_authenticated_limit: Option<u32>,

    /// Override the timezone that defines the daily window (IANA name).
    #[arg(long = "quota-timezone", value_name = "TZ")]
    pub quota_timezone: Option<String>,

    /// Override the Ghostscript executable used for previews.
    #[arg(long = "preview-ghostscript-path", value_name = "PATH")]
    pub preview_ghostscript_path: Option<PathBuf>,

    /// Override the preview resolution.
    #[arg(long = "preview-dpi", value_name = "DPI")]
    pub preview_dpi: Option<u32>,
}
