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

/// Register descriptions for every metric the service emits. Safe to call repeatedly.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "pixelwar_placements_accepted_total",
            Unit::Count,
            "Placements accepted and committed."
        );
        describe_counter!(
            "pixelwar_placements_rejected_total",
            Unit::Count,
            "Placements rejected, labelled by reason."
        );
        describe_counter!(
            "pixelwar_durable_divergence_total",
            Unit::Count,
            "Placements written to the cache whose durable append failed."
        );
        describe_counter!(
            "pixelwar_publish_failures_total",
            Unit::Count,
            "Update events that could not be published."
        );
        describe_counter!(
            "pixelwar_relay_events_total",
            Unit::Count,
            "Update events relayed to the fan-out."
        );
        describe_counter!(
            "pixelwar_relay_decode_failures_total",
            Unit::Count,
            "Channel messages skipped because they could not be decoded."
        );
        describe_counter!(
            "pixelwar_relay_reconnects_total",
            Unit::Count,
            "Relay subscription attempts after a failure or disconnect."
        );
        describe_gauge!(
            "pixelwar_fanout_sessions",
            Unit::Count,
            "Currently registered viewer sessions."
        );
        describe_counter!(
            "pixelwar_fanout_delivery_failures_total",
            Unit::Count,
            "Deliveries that failed and removed the viewer."
        );
        describe_histogram!(
            "pixelwar_snapshot_ms",
            Unit::Milliseconds,
            "Canvas snapshot reconstruction latency in milliseconds."
        );
    });
}
