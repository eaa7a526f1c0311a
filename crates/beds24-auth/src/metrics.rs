//! Credential lifecycle counters
//!
//! Emitted through the `metrics` facade; without an installed recorder every
//! call is a no-op. Names:
//!
//! - `beds24_auth_setup_total` (counter): label `outcome`
//! - `beds24_auth_refresh_total` (counter): label `outcome`
//! - `beds24_auth_token_requests_total` (counter): label `source`

/// Successful operations use this outcome label; failures use `Error::outcome()`.
pub const SUCCESS: &str = "success";

/// Record an invite code exchange attempt.
pub fn record_setup(outcome: &'static str) {
    ::metrics::counter!("beds24_auth_setup_total", "outcome" => outcome).increment(1);
}

/// Record an access token refresh attempt.
pub fn record_refresh(outcome: &'static str) {
    ::metrics::counter!("beds24_auth_refresh_total", "outcome" => outcome).increment(1);
}

/// Record where a `get_valid_token()` answer came from:
/// `cached`, `refreshed` or `unavailable`.
pub fn record_token_request(source: &'static str) {
    ::metrics::counter!("beds24_auth_token_requests_total", "source" => source).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};

    /// Isolated recorder/handle pair; install_recorder() is a process-wide singleton.
    fn isolated_recorder() -> (PrometheusRecorder, PrometheusHandle) {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        (recorder, handle)
    }

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        record_setup(SUCCESS);
        record_refresh("rejected");
        record_token_request("cached");
    }

    #[test]
    fn refresh_outcomes_render_as_labels() {
        let (recorder, handle) = isolated_recorder();
        let _guard = ::metrics::set_default_local_recorder(&recorder);

        record_refresh(SUCCESS);
        record_refresh("rejected");
        record_refresh("rejected");

        let output = handle.render();
        assert!(output.contains("beds24_auth_refresh_total{outcome=\"success\"} 1"));
        assert!(output.contains("beds24_auth_refresh_total{outcome=\"rejected\"} 2"));
    }

    #[test]
    fn setup_and_token_request_counters_render() {
        let (recorder, handle) = isolated_recorder();
        let _guard = ::metrics::set_default_local_recorder(&recorder);

        record_setup("transport");
        record_token_request("cached");
        record_token_request("unavailable");

        let output = handle.render();
        assert!(output.contains("beds24_auth_setup_total{outcome=\"transport\"} 1"));
        assert!(output.contains("beds24_auth_token_requests_total{source=\"cached\"} 1"));
        assert!(output.contains("beds24_auth_token_requests_total{source=\"unavailable\"} 1"));
    }
}
