use std::{sync::Arc, time::Instant};

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

const NAMESPACE: &str = "userbase";

/// Request counters for the HTTP surface, kept in a registry owned by the
/// app state rather than the process-global one.
pub struct Metrics {
    registry: Registry,
    received: IntCounter,
    responses: IntCounterVec,
    duration: HistogramVec,
    in_flight: IntGauge,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let received = IntCounter::with_opts(
            Opts::new("http_requests_received_total", "Requests received").namespace(NAMESPACE),
        )?;
        let responses = IntCounterVec::new(
            Opts::new("http_responses_total", "Responses sent by method and status")
                .namespace(NAMESPACE),
            &["method", "status"],
        )?;
        let duration = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "Time from request received to response produced",
            )
            .namespace(NAMESPACE),
            &["method"],
        )?;
        let in_flight = IntGauge::with_opts(
            Opts::new("http_requests_in_flight", "Requests currently being handled")
                .namespace(NAMESPACE),
        )?;

        registry.register(Box::new(received.clone()))?;
        registry.register(Box::new(responses.clone()))?;
        registry.register(Box::new(duration.clone()))?;
        registry.register(Box::new(in_flight.clone()))?;

        Ok(Self {
            registry,
            received,
            responses,
            duration,
            in_flight,
        })
    }

    /// Prometheus text exposition of every registered metric.
    pub fn render(&self) -> prometheus::Result<String> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}

/// Middleware counting every request and its outcome.
pub async fn track(State(metrics): State<Arc<Metrics>>, req: Request, next: Next) -> Response {
    let method = req.method().as_str().to_owned();
    let started = Instant::now();
    metrics.received.inc();
    metrics.in_flight.inc();

    let res = next.run(req).await;

    metrics.in_flight.dec();
    metrics
        .responses
        .with_label_values(&[method.as_str(), res.status().as_str()])
        .inc();
    metrics
        .duration
        .with_label_values(&[method.as_str()])
        .observe(started.elapsed().as_secs_f64());
    res
}
