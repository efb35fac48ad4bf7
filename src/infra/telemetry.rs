use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::cache::{
    METRIC_CACHE_DEGRADED_TOTAL, METRIC_CACHE_HIT_TOTAL, METRIC_CACHE_INVALIDATE_MS,
    METRIC_CACHE_INVALIDATED_KEYS_TOTAL, METRIC_CACHE_INVALIDATION_FAILURES_TOTAL,
    METRIC_CACHE_MISS_TOTAL,
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
            METRIC_CACHE_HIT_TOTAL,
            Unit::Count,
            "Cache reads answered from the store, labelled by layer."
        );
        describe_counter!(
            METRIC_CACHE_MISS_TOTAL,
            Unit::Count,
            "Cache reads that ran the underlying fetch, labelled by layer."
        );
        describe_counter!(
            METRIC_CACHE_DEGRADED_TOTAL,
            Unit::Count,
            "Store operations that failed or timed out, labelled by operation."
        );
        describe_counter!(
            METRIC_CACHE_INVALIDATED_KEYS_TOTAL,
            Unit::Count,
            "Keys removed by write invalidation, labelled by resource."
        );
        describe_counter!(
            METRIC_CACHE_INVALIDATION_FAILURES_TOTAL,
            Unit::Count,
            "Invalidation targets that could not be purged, labelled by resource."
        );
        describe_histogram!(
            METRIC_CACHE_INVALIDATE_MS,
            Unit::Milliseconds,
            "Latency of a full invalidation dispatch in milliseconds."
        );
    });
}
