use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::application::users::profile;
use crate::cache;
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
            cache::METRIC_CACHE_HIT,
            Unit::Count,
            "Total number of cache lookups that returned a record."
        );
        describe_counter!(
            cache::METRIC_CACHE_MISS,
            Unit::Count,
            "Total number of cache lookups that found no entry."
        );
        describe_counter!(
            cache::METRIC_CACHE_NEGATIVE_HIT,
            Unit::Count,
            "Total number of cache lookups answered by a does-not-exist entry."
        );
        describe_counter!(
            cache::METRIC_ORIGIN_LOAD,
            Unit::Count,
            "Total number of origin loads started by the request coalescer."
        );
        describe_counter!(
            cache::METRIC_COALESCED_WAIT,
            Unit::Count,
            "Total number of callers that attached to an in-flight origin load."
        );
        describe_histogram!(
            profile::METRIC_AGGREGATION_MS,
            Unit::Milliseconds,
            "Profile aggregation latency in milliseconds."
        );
        describe_counter!(
            profile::METRIC_AGGREGATION_TIMEOUT,
            Unit::Count,
            "Total number of profile aggregations that exceeded their deadline."
        );
    });
}
