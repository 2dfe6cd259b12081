//! # Metrics
//!
//! Prometheus metrics for the decrypt engine: key-import outcomes,
//! envelope decrypt attempts/failures by error kind, and bundle walk
//! depth. Scoped to what this crate itself does — no reconciliation,
//! provider-sync, or artifact-fetch counters, since those belong to
//! the out-of-scope control loop (`spec.md` §1).

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, IntGauge, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static KEY_IMPORTS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "bundle_decryptor_key_imports_total",
        "Total number of ImportKeys calls",
    )
    .expect("Failed to create KEY_IMPORTS_TOTAL metric - this should never happen")
});

static KEY_IMPORT_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "bundle_decryptor_key_import_errors_total",
            "Total number of ImportKeys failures, labeled by key backend",
        ),
        &["backend"],
    )
    .expect("Failed to create KEY_IMPORT_ERRORS_TOTAL metric - this should never happen")
});

static ENVELOPE_DECRYPTS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "bundle_decryptor_envelope_decrypts_total",
        "Total number of envelope decrypt attempts",
    )
    .expect("Failed to create ENVELOPE_DECRYPTS_TOTAL metric - this should never happen")
});

static ENVELOPE_DECRYPT_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "bundle_decryptor_envelope_decrypt_errors_total",
            "Total number of envelope decrypt failures, labeled by error kind",
        ),
        &["kind"],
    )
    .expect("Failed to create ENVELOPE_DECRYPT_ERRORS_TOTAL metric - this should never happen")
});

static ENVELOPE_DECRYPT_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "bundle_decryptor_envelope_decrypt_duration_seconds",
            "Duration of a single envelope decrypt in seconds",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
    )
    .expect("Failed to create ENVELOPE_DECRYPT_DURATION metric - this should never happen")
});

static WALK_NODES_VISITED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "bundle_decryptor_walk_nodes_visited_total",
        "Total number of kustomization nodes visited across all walks",
    )
    .expect("Failed to create WALK_NODES_VISITED_TOTAL metric - this should never happen")
});

static WALK_DEPTH: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "bundle_decryptor_walk_depth",
        "Depth of the most recently visited node in the current walk",
    )
    .expect("Failed to create WALK_DEPTH metric - this should never happen")
});

static ENV_SOURCES_DECRYPTED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "bundle_decryptor_env_sources_decrypted_total",
        "Total number of secretGenerator file/env sources decrypted in place",
    )
    .expect("Failed to create ENV_SOURCES_DECRYPTED_TOTAL metric - this should never happen")
});

/// Register every metric above with the crate-local [`REGISTRY`]. Safe
/// to call more than once only because `prometheus::Registry::register`
/// itself errors on a duplicate — callers should call this exactly
/// once per process, matching the teacher's own `register_metrics`.
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(KEY_IMPORTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(KEY_IMPORT_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ENVELOPE_DECRYPTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ENVELOPE_DECRYPT_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ENVELOPE_DECRYPT_DURATION.clone()))?;
    REGISTRY.register(Box::new(WALK_NODES_VISITED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(WALK_DEPTH.clone()))?;
    REGISTRY.register(Box::new(ENV_SOURCES_DECRYPTED_TOTAL.clone()))?;
    Ok(())
}

pub fn increment_key_imports_total() {
    KEY_IMPORTS_TOTAL.inc();
}

pub fn increment_key_import_errors_total(backend: &str) {
    KEY_IMPORT_ERRORS_TOTAL.with_label_values(&[backend]).inc();
}

pub fn increment_envelope_decrypts_total() {
    ENVELOPE_DECRYPTS_TOTAL.inc();
}

pub fn increment_envelope_decrypt_errors_total(kind: &str) {
    ENVELOPE_DECRYPT_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn observe_envelope_decrypt_duration(seconds: f64) {
    ENVELOPE_DECRYPT_DURATION.observe(seconds);
}

pub fn increment_walk_nodes_visited_total() {
    WALK_NODES_VISITED_TOTAL.inc();
}

pub fn set_walk_depth(depth: i64) {
    WALK_DEPTH.set(depth);
}

pub fn increment_env_sources_decrypted_total() {
    ENV_SOURCES_DECRYPTED_TOTAL.inc();
}
