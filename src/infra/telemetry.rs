use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::application::usage::{
    METRIC_DOCUMENT_MS, METRIC_DOCUMENT_PAGES, METRIC_DOCUMENTS_TOTAL,
    METRIC_USAGE_SINK_FAILED_TOTAL,
};
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

pub const METRIC_QUOTA_REJECTED_TOTAL: &str = "pagesmith_quota_rejected_total";

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_DOCUMENTS_TOTAL,
            Unit::Count,
            "Documents produced, labelled by operation."
        );
        describe_histogram!(
            METRIC_DOCUMENT_PAGES,
            Unit::Count,
            "Pages per produced document."
        );
        describe_histogram!(
            METRIC_DOCUMENT_MS,
            Unit::Milliseconds,
            "Time spent producing a document in milliseconds."
        );
        describe_counter!(
            METRIC_USAGE_SINK_FAILED_TOTAL,
            Unit::Count,
            "Usage events a sink failed to record."
        );
        describe_counter!(
            METRIC_QUOTA_REJECTED_TOTAL,
            Unit::Count,
            "Requests refused because the daily quota was exhausted."
        );
    });
}
