use once_cell::sync::Lazy;
use prometheus::{register_int_counter_vec, Encoder, IntCounterVec, TextEncoder};

// Prometheus metrics (default registry), labelled by store name
pub static WRITES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "settings_store_writes_total",
        "Committed preference transactions",
        &["store"]
    )
    .expect("register writes_total")
});

pub static WRITE_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "settings_store_write_failures_total",
        "Preference transactions that failed to commit",
        &["store"]
    )
    .expect("register write_failures_total")
});

pub static READ_FALLBACKS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "settings_store_read_fallbacks_total",
        "Reads that failed with an I/O error and fell back to an empty snapshot",
        &["store"]
    )
    .expect("register read_fallbacks_total")
});

pub static MIGRATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "settings_store_migrations_total",
        "Data migrations applied on first load",
        &["store", "migration"]
    )
    .expect("register migrations_total")
});

/// Render every registered metric in the Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# metrics encode error: {e}\n");
    }
    String::from_utf8(buffer).unwrap_or_default()
}
