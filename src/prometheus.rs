use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

/// Install the global Prometheus recorder and return a handle for rendering
pub fn install_recorder(max_k: usize) -> Result<PrometheusHandle, BuildError> {
    // Duration buckets
    let duration_matcher = Matcher::Suffix(String::from("duration"));
    let n_duration_buckets = 30;
    let mut duration_buckets = Vec::with_capacity(n_duration_buckets);
    // Minimum duration in seconds
    let mut value = 0.0005;
    for _ in 0..n_duration_buckets {
        // geometric sequence
        value *= 1.5;
        duration_buckets.push(value);
    }

    // Result count buckets
    let hits_matcher = Matcher::Full(String::from("gateway_query_hits"));
    let hits_buckets: Vec<f64> = (0..12)
        .map(|x| 2.0_f64.powi(x))
        .filter(|x| (*x as usize) <= max_k.max(1))
        .collect();

    PrometheusBuilder::new()
        .set_buckets_for_metric(duration_matcher, &duration_buckets)?
        .set_buckets_for_metric(hits_matcher, &hits_buckets)?
        .install_recorder()
}
