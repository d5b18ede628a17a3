//metrics.rs
use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, HistogramOpts,
    HistogramVec, IntCounter, IntCounterVec, Opts,
};

lazy_static! {
    // Publish metrics
    pub static ref CASTS_PUBLISHED: IntCounterVec = register_int_counter_vec!(
        Opts::new("casts_published_total", "Casts accepted by the network, by strategy"),
        &["strategy"]
    )
    .unwrap();

    pub static ref REACTIONS_SUBMITTED: IntCounterVec = register_int_counter_vec!(
        Opts::new("reactions_submitted_total", "Reaction adds and removals, by kind"),
        &["kind", "op"]
    )
    .unwrap();

    pub static ref SIGNERS_REGISTERED: IntCounter = register_int_counter!(Opts::new(
        "signers_registered_total",
        "Signed key requests submitted to the signer service"
    ))
    .unwrap();

    // Auth metrics
    pub static ref SIWF_REJECTIONS: IntCounterVec = register_int_counter_vec!(
        Opts::new("siwf_rejections_total", "Sign-in attempts rejected, by reason"),
        &["reason"]
    )
    .unwrap();

    // Upstream metrics
    pub static ref UPSTREAM_FAILURES: IntCounterVec = register_int_counter_vec!(
        Opts::new("upstream_failures_total", "Failed calls to external services"),
        &["service"]
    )
    .unwrap();

    pub static ref UPSTREAM_LATENCY: HistogramVec = register_histogram_vec!(
        HistogramOpts::new(
            "upstream_latency_seconds",
            "Round-trip time of calls to external services"
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["service"]
    )
    .unwrap();
}

pub fn metrics_handler() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        return format!("Error encoding metrics: {}", e);
    }

    match String::from_utf8(buffer) {
        Ok(metrics) => metrics,
        Err(e) => format!("Error converting metrics to string: {}", e),
    }
}
