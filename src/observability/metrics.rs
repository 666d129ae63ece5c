use prometheus::{Encoder, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub submissions_total: IntCounterVec,
    pub pickups_total: IntCounterVec,
    pub backend_errors_total: IntCounterVec,
    pub submission_duration_seconds: HistogramVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let submissions_total = IntCounterVec::new(
            Opts::new("submissions_total", "Parcel submissions by outcome"),
            &["outcome"],
        )
        .expect("valid submissions_total metric");

        let pickups_total = IntCounterVec::new(
            Opts::new("pickups_total", "Pickup attempts by method and outcome"),
            &["method", "outcome"],
        )
        .expect("valid pickups_total metric");

        let backend_errors_total = IntCounterVec::new(
            Opts::new("backend_errors_total", "Backend errors by kind"),
            &["kind"],
        )
        .expect("valid backend_errors_total metric");

        let submission_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "submission_duration_seconds",
                "Wall-clock duration of submission attempts in seconds",
            ),
            &["outcome"],
        )
        .expect("valid submission_duration_seconds metric");

        registry
            .register(Box::new(submissions_total.clone()))
            .expect("register submissions_total");
        registry
            .register(Box::new(pickups_total.clone()))
            .expect("register pickups_total");
        registry
            .register(Box::new(backend_errors_total.clone()))
            .expect("register backend_errors_total");
        registry
            .register(Box::new(submission_duration_seconds.clone()))
            .expect("register submission_duration_seconds");

        Self {
            registry,
            submissions_total,
            pickups_total,
            backend_errors_total,
            submission_duration_seconds,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
