//! Prometheus metrics for the collab node.
//!
//! Counters cover the write-behind worker, the fan-out listener, socket
//! traffic, and cache reads per tier. `/metrics` serves the registry in
//! text format for scraping.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Socket traffic
pub static EVENTS_RECEIVED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "tandem_events_received_total",
            "Inbound socket events by event name",
        ),
        &["event"],
    )
    .expect("metric creation failed")
});

pub static EVENT_ERRORS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "tandem_event_errors_total",
            "Rejected socket events by error kind",
        ),
        &["kind"],
    )
    .expect("metric creation failed")
});

pub static CONNECTED_SESSIONS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "tandem_connected_sessions",
        "Current number of authenticated socket sessions",
    )
    .expect("metric creation failed")
});

pub static REVISION_CONFLICTS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "tandem_revision_conflicts_total",
        "Updates rejected because the client revision was behind",
    )
    .expect("metric creation failed")
});

// Cache tiers
pub static CACHE_READS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "tandem_cache_reads_total",
            "List state reads resolved per cache tier",
        ),
        &["tier"],
    )
    .expect("metric creation failed")
});

pub static CACHED_LISTS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "tandem_cached_lists",
        "Lists currently held in the in-process cache",
    )
    .expect("metric creation failed")
});

// Write-behind worker
pub static WRITES_PROCESSED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "tandem_writes_processed_total",
        "Durable writes applied by the write-behind worker",
    )
    .expect("metric creation failed")
});

pub static WRITES_FAILED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "tandem_writes_failed_total",
        "Durable writes that failed in the write-behind worker",
    )
    .expect("metric creation failed")
});

pub static WRITE_QUEUE_OVERFLOW: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "tandem_write_queue_overflow_total",
        "Mutations dropped because the write queue was full",
    )
    .expect("metric creation failed")
});

pub static WRITES_DROPPED_ON_SHUTDOWN: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "tandem_writes_dropped_on_shutdown_total",
        "Queued writes left unflushed when the drain timeout expired",
    )
    .expect("metric creation failed")
});

pub static WRITE_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "tandem_write_duration_seconds",
            "Time taken to persist one queued mutation",
        )
        .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
    )
    .expect("metric creation failed")
});

// Fan-out listener
pub static PUBSUB_MESSAGES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "tandem_pubsub_messages_total",
            "Fan-out bus messages consumed by type",
        ),
        &["type"],
    )
    .expect("metric creation failed")
});

pub static PUBSUB_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "tandem_pubsub_failures_total",
        "Fan-out bus messages that failed to decode or apply",
    )
    .expect("metric creation failed")
});

/// Register all metrics with the global registry. Idempotent.
pub fn register_metrics() {
    static REGISTER: Once = Once::new();
    REGISTER.call_once(|| {
        let registry = &*REGISTRY;
        registry
            .register(Box::new(EVENTS_RECEIVED.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(EVENT_ERRORS.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(CONNECTED_SESSIONS.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(REVISION_CONFLICTS.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(CACHE_READS.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(CACHED_LISTS.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(WRITES_PROCESSED.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(WRITES_FAILED.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(WRITE_QUEUE_OVERFLOW.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(WRITES_DROPPED_ON_SHUTDOWN.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(WRITE_DURATION.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(PUBSUB_MESSAGES.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(PUBSUB_FAILURES.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus text exposition.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, String::new());
    }
    match String::from_utf8(buffer) {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            tracing::error!(error = %e, "Metrics were not valid UTF-8");
            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_idempotent() {
        register_metrics();
        register_metrics();
        EVENTS_RECEIVED.with_label_values(&["join"]).inc();
        assert!(EVENTS_RECEIVED.with_label_values(&["join"]).get() >= 1);
    }
}
