use std::{process, sync::Arc};

use pagesmith::{
    application::{
        assembly::DocumentAssembler,
        convert::RasterExporter,
        error::AppError,
        preview::{PreviewFetcher, Rasterizer},
        quota::{MemoryQuotaStore, QuotaGate, QuotaStore, SystemClock},
        transfer::TransferMailbox,
        usage::{MetricsUsageSink, UsageRecorder, UsageSink},
    },
    config,
    domain::quota::QuotaWindow,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        ghostscript::GhostscriptRasterizer,
        http::{self, AppState, IdentityResolver, UploadLimits},
        pdf::LopdfLibrary,
        telemetry,
    },
};
use tokio::sync::Notify;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
    }
}

async fn connect_database(
    settings: &config::Settings,
) -> Result<Option<PostgresRepositories>, AppError> {
    let Some(database_url) = settings.database.url.as_deref() else {
        return Ok(None);
    };

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;
    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;
    Ok(Some(PostgresRepositories::new(pool)))
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    if settings.database.url.is_none() {
        return Err(AppError::validation(
            "database url is required (provide --database-url or set PAGESMITH__DATABASE__URL)",
        ));
    }
    connect_database(&settings).await?;
    info!("database migrations applied");
    Ok(())
}

fn build_state(settings: &config::Settings, db: Option<PostgresRepositories>) -> AppState {
    let library = Arc::new(LopdfLibrary::new());
    let rasterizer: Arc<dyn Rasterizer> = Arc::new(GhostscriptRasterizer::new(
        settings.preview.ghostscript_path.clone(),
        settings.preview.device.clone(),
        settings.preview.dpi.get(),
    ));

    let local: Arc<dyn QuotaStore> = Arc::new(MemoryQuotaStore::new());
    let remote: Arc<dyn QuotaStore> = match &db {
        Some(db) => Arc::new(db.clone()),
        None => {
            warn!("no database configured; authenticated quota is kept in memory");
            Arc::new(MemoryQuotaStore::new())
        }
    };
    let quota = QuotaGate::new(
        QuotaWindow::new(settings.quota.timezone),
        settings.quota.limits,
        local,
        remote,
        Arc::new(SystemClock),
    );

    let mut sinks: Vec<Arc<dyn UsageSink>> = vec![Arc::new(MetricsUsageSink)];
    if let Some(db) = &db {
        sinks.push(Arc::new(db.clone()));
    }

    AppState {
        assembler: DocumentAssembler::new(Arc::clone(&library)),
        exporter: RasterExporter::new(
            Arc::clone(&library),
            Arc::clone(&rasterizer),
            settings.preview.export_max_pages.get(),
        ),
        previews: PreviewFetcher::new(library, rasterizer, settings.preview.max_pages.get()),
        quota,
        usage: UsageRecorder::new(sinks),
        transfers: TransferMailbox::new(
            settings.transfer.ttl,
            settings.transfer.max_entries.get() as usize,
        ),
        identity: IdentityResolver::new(
            settings.identity.user_header.clone(),
            settings.identity.client_header.clone(),
        ),
        limits: UploadLimits {
            max_request_bytes: usize::try_from(settings.uploads.max_request_bytes.get())
                .unwrap_or(usize::MAX),
            max_files: settings.uploads.max_files.get() as usize,
        },
        db,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let db = connect_database(&settings).await?;
    let state = build_state(&settings, db);
    serve_http(&settings, state).await
}

async fn serve_http(settings: &config::Settings, state: AppState) -> Result<(), AppError> {
    let router = http::build_router(state);
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %settings.server.addr, "listening");

    let shutdown = Arc::new(Notify::new());
    let signal = Arc::clone(&shutdown);
    let mut server = tokio::spawn(async move {
        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(async move { signal.notified().await })
            .await
    });

    tokio::select! {
        joined = &mut server => return flatten_server(joined),
        result = tokio::signal::ctrl_c() => {
            result.map_err(|err| AppError::from(InfraError::from(err)))?;
            info!("shutdown requested");
        }
    }
    shutdown.notify_one();

    let grace = settings.server.graceful_shutdown;
    match tokio::time::timeout(grace, &mut server).await {
        Ok(joined) => flatten_server(joined),
        Err(_) => {
            warn!(
                grace_seconds = grace.as_secs(),
                "in-flight requests did not finish in time"
            );
            server.abort();
            Ok(())
        }
    }
}

fn flatten_server(
    joined: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), AppError> {
    joined
        .map_err(|err| AppError::unexpected(format!("server task failed: {err}")))?
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))
}
