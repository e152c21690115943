use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, HistogramVec, Registry, TextEncoder, opts,
    register_counter_vec_with_registry, register_histogram_vec_with_registry,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref REQUEST_COUNTER: CounterVec = register_counter_vec_with_registry!(
        opts!(
            "loopmock_requests_total",
            "Total number of requests answered by the mock listener"
        ),
        &["matched", "method"],
        REGISTRY
    )
    .unwrap();
    pub static ref REQUEST_DURATION: HistogramVec = register_histogram_vec_with_registry!(
        "loopmock_request_duration_seconds",
        "Histogram of mock response latencies in seconds, including configured delays",
        &["matched"],
        REGISTRY
    )
    .unwrap();
}

pub fn record_request(matched: bool, method: &str, seconds: f64) {
    let matched = if matched { "true" } else { "false" };
    REQUEST_COUNTER.with_label_values(&[matched, method]).inc();
    REQUEST_DURATION
        .with_label_values(&[matched])
        .observe(seconds);
}

pub fn register_process_metrics() {
    #[cfg(target_os = "linux")]
    {
        let process_collector = prometheus::process_collector::ProcessCollector::for_self();
        if let Err(e) = REGISTRY.register(Box::new(process_collector)) {
            tracing::warn!("Process metrics unavailable: {}", e);
        }
    }
}

/// Registry contents in the prometheus text format.
pub fn render() -> (String, String) {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    (
        encoder.format_type().to_string(),
        String::from_utf8_lossy(&buffer).into_owned(),
    )
}
