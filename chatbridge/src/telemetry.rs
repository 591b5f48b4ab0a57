use anyhow::{Context, Result};
use opentelemetry::{
    global,
    metrics::{Counter, Histogram, Meter},
    KeyValue,
};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{metrics::SdkMeterProvider, Resource};
use std::time::Duration;
use tracing::info;

/// Bridge traffic metrics
pub struct BridgeMetrics {
    // Input read round-trips
    pub read_latency: Histogram<f64>,
    pub read_timeouts: Counter<u64>,

    // Fire-and-forget commands posted to the UI
    pub commands: Counter<u64>,

    pub notifications: Counter<u64>,
    pub approvals: Counter<u64>,
}

impl BridgeMetrics {
    pub fn new(meter: &Meter) -> Self {
        let read_latency = meter
            .f64_histogram("chatbridge.read.latency_ms")
            .with_description("Input read round-trip latency in milliseconds")
            .build();

        let read_timeouts = meter
            .u64_counter("chatbridge.read.timeouts")
            .with_description("Input reads that resolved empty after the wait bound")
            .build();

        let commands = meter
            .u64_counter("chatbridge.commands")
            .with_description("Commands posted to the UI channel")
            .build();

        let notifications = meter
            .u64_counter("chatbridge.notifications")
            .with_description("Assistant output notifications published")
            .build();

        let approvals = meter
            .u64_counter("chatbridge.approvals")
            .with_description("Gated action approval attempts")
            .build();

        Self {
            read_latency,
            read_timeouts,
            commands,
            notifications,
            approvals,
        }
    }

    pub fn record_read(&self, latency_ms: f64, outcome: &'static str) {
        self.read_latency
            .record(latency_ms, &[KeyValue::new("outcome", outcome)]);
        if outcome == "timeout" {
            self.read_timeouts.add(1, &[]);
        }
    }

    pub fn record_command(&self, command: &'static str, outcome: &'static str) {
        self.commands.add(
            1,
            &[
                KeyValue::new("command", command),
                KeyValue::new("outcome", outcome),
            ],
        );
    }

    pub fn record_notification(&self, subscribers: usize) {
        self.notifications.add(
            1,
            &[KeyValue::new("subscribers", subscribers as i64)],
        );
    }

    pub fn record_approval(&self, outcome: &'static str) {
        self.approvals.add(1, &[KeyValue::new("outcome", outcome)]);
    }
}

/// Initialize OTLP metrics export
pub fn init_metrics(
    endpoint: Option<String>,
    service_name: &str,
) -> Result<(SdkMeterProvider, BridgeMetrics)> {
    let endpoint = endpoint.unwrap_or_else(|| "http://localhost:4318".to_string());

    info!("Initializing OTLP telemetry: endpoint={}", endpoint);

    let export_config = opentelemetry_otlp::ExportConfig {
        endpoint: Some(endpoint.clone()),
        timeout: Duration::from_secs(10),
        ..Default::default()
    };

    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_http()
        .with_export_config(export_config)
        .build()
        .context("building OTLP metric exporter")?;

    let reader = opentelemetry_sdk::metrics::PeriodicReader::builder(
        exporter,
        opentelemetry_sdk::runtime::Tokio,
    )
    .with_interval(Duration::from_secs(30))
    .build();

    let resource = Resource::new(vec![
        KeyValue::new("service.name", service_name.to_string()),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
    ]);

    let provider = SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(resource)
        .build();

    global::set_meter_provider(provider.clone());

    let meter = global::meter("chatbridge");
    let metrics = BridgeMetrics::new(&meter);

    info!("OTLP telemetry initialized");

    Ok((provider, metrics))
}

pub fn shutdown_metrics(provider: SdkMeterProvider) -> Result<()> {
    info!("Shutting down telemetry");
    provider
        .shutdown()
        .context("shutting down meter provider")?;
    Ok(())
}
