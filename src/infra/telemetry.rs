use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

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
            "voicegen_jobs_submitted_total",
            Unit::Count,
            "Total number of generation jobs accepted and queued."
        );
        describe_counter!(
            "voicegen_jobs_completed_total",
            Unit::Count,
            "Total number of completion callbacks applied, labelled by outcome."
        );
        describe_counter!(
            "voicegen_jobs_dropped_total",
            Unit::Count,
            "Total number of jobs discarded because the work queue had no consumer."
        );
        describe_counter!(
            "voicegen_jobs_requeued_total",
            Unit::Count,
            "Total number of jobs put back on the work queue after a failed delivery."
        );
        describe_counter!(
            "voicegen_delivery_attempts_total",
            Unit::Count,
            "Total number of delivery attempts to the rendering service."
        );
        describe_counter!(
            "voicegen_delivery_failures_total",
            Unit::Count,
            "Total number of delivery attempts that failed."
        );
        describe_counter!(
            "voicegen_connect_failures_total",
            Unit::Count,
            "Total number of failed connection attempts to the rendering service."
        );
        describe_gauge!(
            "voicegen_queue_depth",
            Unit::Count,
            "Current number of jobs waiting for delivery."
        );
        describe_histogram!(
            "voicegen_delivery_ms",
            Unit::Milliseconds,
            "Time from sending a job to receiving the rendering service's response."
        );
    });
}
