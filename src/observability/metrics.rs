// ============================================================================
// PROMETHEUS METRICS
// ============================================================================

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, HistogramVec,
    IntCounter, IntCounterVec,
};

lazy_static! {
    // ========================================================================
    // HTTP REQUEST METRICS
    // ========================================================================

    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "endpoint", "status"]
    )
    .unwrap();

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "endpoint"],
        vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0]
    )
    .unwrap();

    // ========================================================================
    // REDEMPTION FLOW
    // ========================================================================

    /// Claim requests by outcome (`issued` or the refusal reason)
    pub static ref CLAIMS_ISSUED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "claims_issued_total",
        "Claim issuance attempts by result",
        &["result"]
    )
    .unwrap();

    /// Counter validations by outcome and entry method
    pub static ref REDEMPTION_VALIDATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "redemption_validations_total",
        "Counter validations by result and entry method",
        &["result", "entry"]
    )
    .unwrap();

    pub static ref REDEMPTION_VALIDATION_DURATION: HistogramVec = register_histogram_vec!(
        "redemption_validation_duration_seconds",
        "Time spent in the atomic redeem call",
        &["entry"],
        vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]
    )
    .unwrap();

    /// Claims moved to expired by the sweeper
    pub static ref CLAIMS_EXPIRED_TOTAL: IntCounter = register_int_counter!(
        "claims_expired_total",
        "Issued claims expired by the sweeper"
    )
    .unwrap();
}

pub fn record_http_request(method: &str, endpoint: &str, status: u16, duration_secs: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, endpoint, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, endpoint])
        .observe(duration_secs);
}

pub fn record_claim_issued(result: &str) {
    CLAIMS_ISSUED_TOTAL.with_label_values(&[result]).inc();
}

pub fn record_validation(result: &str, entry: &str, duration_secs: f64) {
    REDEMPTION_VALIDATIONS_TOTAL
        .with_label_values(&[result, entry])
        .inc();
    REDEMPTION_VALIDATION_DURATION
        .with_label_values(&[entry])
        .observe(duration_secs);
}

pub fn record_claims_expired(count: u64) {
    CLAIMS_EXPIRED_TOTAL.inc_by(count);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_increment() {
        let before = CLAIMS_ISSUED_TOTAL.with_label_values(&["metrics_test"]).get();
        record_claim_issued("metrics_test");
        assert_eq!(CLAIMS_ISSUED_TOTAL.with_label_values(&["metrics_test"]).get(), before + 1);

        let before = REDEMPTION_VALIDATIONS_TOTAL.with_label_values(&["metrics_test", "manual"]).get();
        record_validation("metrics_test", "manual", 0.002);
        assert_eq!(
            REDEMPTION_VALIDATIONS_TOTAL.with_label_values(&["metrics_test", "manual"]).get(),
            before + 1
        );
    }
}
