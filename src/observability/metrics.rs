//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_jobs_total` (counter): finished jobs by queue, outcome
//! - `relay_queue_depth` (gauge): jobs by queue, state
//! - `relay_capacity_paused` (gauge): 1 while submission is paused
//! - `relay_epoch_capacity_used` (gauge): capacity recorded this epoch
//! - `relay_nonce_resyncs_total` (counter): nonce cache invalidations
//! - `relay_notifications_total` (counter): webhook deliveries by outcome
//! - `relay_finalized_block` (gauge): last finalized block seen

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Start the Prometheus scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_job(queue: &'static str, outcome: &'static str) {
    ::metrics::counter!("relay_jobs_total", "queue" => queue, "outcome" => outcome).increment(1);
}

pub fn record_queue_depth(queue: &'static str, state: &'static str, depth: usize) {
    ::metrics::gauge!("relay_queue_depth", "queue" => queue, "state" => state).set(depth as f64);
}

pub fn record_capacity_paused(paused: bool) {
    ::metrics::gauge!("relay_capacity_paused").set(if paused { 1.0 } else { 0.0 });
}

pub fn record_epoch_capacity_used(used: u128) {
    ::metrics::gauge!("relay_epoch_capacity_used").set(used as f64);
}

pub fn record_nonce_resync() {
    ::metrics::counter!("relay_nonce_resyncs_total").increment(1);
}

pub fn record_notification(outcome: &'static str) {
    ::metrics::counter!("relay_notifications_total", "outcome" => outcome).increment(1);
}

pub fn record_finalized_block(number: u64) {
    ::metrics::gauge!("relay_finalized_block").set(number as f64);
}
