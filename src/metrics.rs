//! Prometheus counters/histograms for the pipeline's own health, gated
//! behind the `prometheus` feature. Observability of the proxy itself is
//! ambient infrastructure, not one of the request-handling features that
//! get scoped out.

use std::time::Duration;

#[cfg(feature = "prometheus")]
pub fn record_cache_hit() {
    metrics::counter!("lumina_cache_hit_total").increment(1);
}
#[cfg(not(feature = "prometheus"))]
pub fn record_cache_hit() {}

#[cfg(feature = "prometheus")]
pub fn record_cache_miss() {
    metrics::counter!("lumina_cache_miss_total").increment(1);
}
#[cfg(not(feature = "prometheus"))]
pub fn record_cache_miss() {}

#[cfg(feature = "prometheus")]
pub fn record_log_entry_dropped() {
    metrics::counter!("lumina_log_entries_dropped_total").increment(1);
}
#[cfg(not(feature = "prometheus"))]
pub fn record_log_entry_dropped() {}

#[cfg(feature = "prometheus")]
pub fn record_bulk_flush_duration(elapsed: Duration) {
    metrics::histogram!("lumina_log_bulk_flush_duration_seconds").record(elapsed.as_secs_f64());
}
#[cfg(not(feature = "prometheus"))]
pub fn record_bulk_flush_duration(_elapsed: Duration) {}

#[cfg(feature = "prometheus")]
pub fn record_proxy_request(provider: &str, status: u16) {
    metrics::counter!(
        "lumina_proxy_requests_total",
        "provider" => provider.to_string(),
        "status" => status.to_string(),
    )
    .increment(1);
}
#[cfg(not(feature = "prometheus"))]
pub fn record_proxy_request(_provider: &str, _status: u16) {}
