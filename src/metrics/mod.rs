//! Prometheus metrics for the bridge
//!
//! This module provides metrics tracking for:
//! - Polling: refresh outcomes and durations
//! - Webhooks: inbound calls by outcome, registered webhooks per entry
//! - Relay: forwarded events by outcome
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, or is never called, metric operations are no-ops.

use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram, CounterVec, Encoder, GaugeVec,
    Histogram, TextEncoder,
};
use std::sync::OnceLock;
use std::time::Duration;

use crate::webhooks::dispatcher::DispatchOutcome;

// ============================================================================
// Metrics Storage
// ============================================================================

struct BridgeMetrics {
    refreshes: CounterVec,
    refresh_duration: Histogram,
    webhooks_received: CounterVec,
    registered_webhooks: GaugeVec,
    relay_deliveries: CounterVec,
}

static METRICS: OnceLock<BridgeMetrics> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// Safe to call more than once; later calls are no-ops.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = flowhome_bridge::metrics::init_metrics() {
///     eprintln!("Warning: Metrics initialization failed: {}", e);
/// }
/// ```
pub fn init_metrics() -> Result<(), prometheus::Error> {
    if METRICS.get().is_some() {
        return Ok(());
    }

    let metrics = BridgeMetrics {
        refreshes: register_counter_vec!(
            "flowhome_refreshes_total",
            "Snapshot refresh attempts by outcome",
            &["outcome"]
        )?,
        refresh_duration: register_histogram!(
            "flowhome_refresh_duration_seconds",
            "Duration of a full four-resource refresh in seconds",
            vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
        )?,
        webhooks_received: register_counter_vec!(
            "flowhome_webhooks_received_total",
            "Inbound webhook calls by dispatch outcome",
            &["outcome"]
        )?,
        registered_webhooks: register_gauge_vec!(
            "flowhome_registered_webhooks",
            "Webhooks currently registered per entry",
            &["entry"]
        )?,
        relay_deliveries: register_counter_vec!(
            "flowhome_relay_deliveries_total",
            "Events forwarded to the automation host by outcome",
            &["outcome"]
        )?,
    };

    if METRICS.set(metrics).is_ok() {
        tracing::info!("Prometheus metrics initialized");
    }
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

fn outcome_label(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failure"
    }
}

/// Record one refresh attempt
pub fn record_refresh(success: bool, elapsed: Duration) {
    let Some(m) = METRICS.get() else {
        return;
    };

    m.refreshes.with_label_values(&[outcome_label(success)]).inc();
    m.refresh_duration.observe(elapsed.as_secs_f64());
}

/// Record one inbound webhook call
pub fn record_webhook_received(outcome: DispatchOutcome) {
    let Some(m) = METRICS.get() else {
        return;
    };

    let label = match outcome {
        DispatchOutcome::Delivered => "delivered",
        DispatchOutcome::UnknownWebhook => "unknown_webhook",
        DispatchOutcome::RejectedNonLocal => "rejected_non_local",
    };
    m.webhooks_received.with_label_values(&[label]).inc();
}

/// Update the registered-webhook gauge for an entry
pub fn set_registered_webhooks(entry_id: &str, count: usize) {
    if let Some(m) = METRICS.get() {
        m.registered_webhooks
            .with_label_values(&[entry_id])
            .set(count as f64);
    }
}

/// Record one relay delivery
pub fn record_relay(success: bool) {
    if let Some(m) = METRICS.get() {
        m.relay_deliveries
            .with_label_values(&[outcome_label(success)])
            .inc();
    }
}

// ============================================================================
// Tests
// ============================================================================
