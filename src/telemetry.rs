//! OpenTelemetry instruments recorded by the library.
//!
//! Instruments come from the global meter provider, which records nothing
//! until the host application installs one, for example with
//! [`install_otlp_meter_provider`].

use anyhow::Context;
use opentelemetry::metrics::{Counter, Histogram};
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::MeterProvider;
use opentelemetry_sdk::{runtime, Resource};
use std::sync::OnceLock;
use tracing::info;

use crate::models::Hit;
use crate::run_request::ClampedOverride;

/// Export metrics over OTLP/HTTP to `addr` and make it the global meter
/// provider.
///
/// Must run before the first run or attack; instruments bind to the
/// provider that is global when they are first used. Call `shutdown` on the
/// returned provider to flush pending metrics.
pub fn install_otlp_meter_provider(addr: &str) -> anyhow::Result<MeterProvider> {
    let exporter = opentelemetry_otlp::new_exporter()
        .http()
        .with_endpoint(format!("{}/v1/metrics", addr.trim_end_matches('/')));
    let provider = opentelemetry_otlp::new_pipeline()
        .metrics(runtime::Tokio)
        .with_exporter(exporter)
        .with_resource(Resource::new(vec![KeyValue::new("service.name", "bombard")]))
        .build()
        .with_context(|| format!("Failed to set up OTLP metrics export to {}", addr))?;
    global::set_meter_provider(provider.clone());
    info!(event = "otlp_metrics_installed", endpoint = %addr, message = "Exporting metrics over OTLP");
    Ok(provider)
}

struct Instruments {
    clamped_overrides: Counter<u64>,
    hits: Counter<u64>,
    hit_latency: Histogram<f64>,
}

fn instruments() -> &'static Instruments {
    static INSTRUMENTS: OnceLock<Instruments> = OnceLock::new();
    INSTRUMENTS.get_or_init(|| {
        let meter = global::meter("bombard");
        Instruments {
            clamped_overrides: meter
                .u64_counter("bombard.clamped_overrides")
                .with_description("Client overrides rejected because they exceed a ceiling")
                .init(),
            hits: meter
                .u64_counter("bombard.hits")
                .with_description("Requests fired by attacks")
                .init(),
            hit_latency: meter
                .f64_histogram("bombard.hit_latency")
                .with_description("Attack request latency in seconds")
                .init(),
        }
    })
}

pub(crate) fn record_clamped(target_id: &str, clamped: &[ClampedOverride]) {
    let counter = &instruments().clamped_overrides;
    for c in clamped {
        counter.add(
            1,
            &[
                KeyValue::new("target_id", target_id.to_string()),
                KeyValue::new("field", c.field()),
            ],
        );
    }
}

pub(crate) fn record_hit(hit: &Hit) {
    let outcome = if hit.error.is_some() {
        "error"
    } else if hit.is_success() {
        "success"
    } else {
        "failure"
    };
    let attributes = [KeyValue::new("outcome", outcome)];
    let instruments = instruments();
    instruments.hits.add(1, &attributes);
    instruments
        .hit_latency
        .record(hit.latency.as_secs_f64(), &attributes);
}
