//! # Prometheus Metrics
//!
//! Counters for the transaction endpoint, scraped at `/metrics` on the
//! metrics port. All metrics live in a dedicated registry with the `webpay`
//! prefix.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Duration;

use webpay_protocol::provider::{EndpointReply, Operation, ReplyStatus};

/// Metric handles of one node.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Reserve or direct-debit requests handled.
    pub reserve_debit_total: IntCounter,
    /// Finalize requests handled.
    pub finalize_total: IntCounter,
    /// Signed business declines (insufficient funds, expired, ...).
    pub declined_total: IntCounter,
    /// Requests answered with an `ErrorResponse`.
    pub failed_total: IntCounter,
    pub request_latency_seconds: Histogram,
}

impl NodeMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("webpay".into()), None)?;

        let reserve_debit_total = IntCounter::new(
            "reserve_debit_total",
            "Reserve-funds and direct-debit requests handled",
        )?;
        registry.register(Box::new(reserve_debit_total.clone()))?;

        let finalize_total = IntCounter::new("finalize_total", "Finalize requests handled")?;
        registry.register(Box::new(finalize_total.clone()))?;

        let declined_total =
            IntCounter::new("declined_total", "Requests answered with a signed decline")?;
        registry.register(Box::new(declined_total.clone()))?;

        let failed_total =
            IntCounter::new("failed_total", "Requests answered with an ErrorResponse")?;
        registry.register(Box::new(failed_total.clone()))?;

        let request_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "request_latency_seconds",
                "Time spent handling a transaction request",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        )?;
        registry.register(Box::new(request_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            reserve_debit_total,
            finalize_total,
            declined_total,
            failed_total,
            request_latency_seconds,
        })
    }

    /// Count one handled request.
    pub fn record(&self, reply: &EndpointReply, elapsed: Duration) {
        match reply.operation {
            Operation::ReserveOrDebit => self.reserve_debit_total.inc(),
            Operation::Finalize => self.finalize_total.inc(),
            Operation::Unrouted => {}
        }
        match reply.status {
            ReplyStatus::Approved => {}
            ReplyStatus::Declined => self.declined_total.inc(),
            ReplyStatus::Failed => self.failed_total.inc(),
        }
        self.request_latency_seconds.observe(elapsed.as_secs_f64());
    }

    /// Prometheus text exposition of every registered metric.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

pub type SharedMetrics = Arc<NodeMetrics>;

/// `GET /metrics`.
pub async fn metrics_handler(State(metrics): State<SharedMetrics>) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
