//! # Prometheus Metrics
//!
//! Registrar activity counters, scraped from `/metrics` on the metrics
//! port. Everything lives in a dedicated registry under the `nomina`
//! prefix.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

use nomina_contracts::error::RegistrarError;
use nomina_contracts::events::{CreditReason, RegistrarEvent};

#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Successful claims, labelled by claim path.
    pub registrations_total: IntCounterVec,
    pub renewals_total: IntCounter,
    pub subnames_total: IntCounter,
    /// Rejected calls, labelled by error kind.
    pub rejected_calls_total: IntCounterVec,
    /// Native base units credited as proceeds. Wraps around at `u64::MAX`
    /// base units, which is far beyond any devnet volume.
    pub proceeds_collected: IntCounter,
    /// Records held by the registry, live or not.
    pub names_registered: IntGauge,
    pub rpc_latency_seconds: Histogram,
}

impl NodeMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("nomina".into()), None)?;

        let registrations_total = IntCounterVec::new(
            Opts::new("registrations_total", "Names claimed, by claim path"),
            &["path"],
        )?;
        registry.register(Box::new(registrations_total.clone()))?;

        let renewals_total = IntCounter::new("renewals_total", "Paid renewals")?;
        registry.register(Box::new(renewals_total.clone()))?;

        let subnames_total = IntCounter::new("subnames_total", "Sub-names created or overwritten")?;
        registry.register(Box::new(subnames_total.clone()))?;

        let rejected_calls_total = IntCounterVec::new(
            Opts::new("rejected_calls_total", "Registrar calls that failed, by error kind"),
            &["kind"],
        )?;
        registry.register(Box::new(rejected_calls_total.clone()))?;

        let proceeds_collected = IntCounter::new(
            "proceeds_collected_base_units",
            "Native base units credited to payment recipients",
        )?;
        registry.register(Box::new(proceeds_collected.clone()))?;

        let names_registered = IntGauge::new("names_registered", "Records in the registry")?;
        registry.register(Box::new(names_registered.clone()))?;

        let rpc_latency_seconds = Histogram::with_opts(
            HistogramOpts::new("rpc_latency_seconds", "JSON-RPC handling latency in seconds")
                .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )?;
        registry.register(Box::new(rpc_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            registrations_total,
            renewals_total,
            subnames_total,
            rejected_calls_total,
            proceeds_collected,
            names_registered,
            rpc_latency_seconds,
        })
    }

    /// Updates counters from the events a call produced.
    pub fn observe_events(&self, events: &[RegistrarEvent]) {
        for event in events {
            match event {
                RegistrarEvent::NameClaimed { path, .. } => {
                    self.registrations_total
                        .with_label_values(&[path.as_str()])
                        .inc();
                }
                RegistrarEvent::RenewalPaid { .. } => self.renewals_total.inc(),
                RegistrarEvent::SubnameRegistered { .. } => self.subnames_total.inc(),
                RegistrarEvent::PaymentCredited {
                    amount,
                    reason: CreditReason::Proceeds,
                    ..
                } => {
                    let units = u64::try_from(amount.raw()).unwrap_or(u64::MAX);
                    self.proceeds_collected.inc_by(units);
                }
                _ => {}
            }
        }
    }

    pub fn observe_rejection(&self, error: &RegistrarError) {
        self.rejected_calls_total
            .with_label_values(&[&error.kind().to_string()])
            .inc();
    }

    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

pub type SharedMetrics = Arc<NodeMetrics>;

/// Renders `/metrics` in the Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
