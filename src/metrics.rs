//! Detection metrics
//!
//! Counters go through the `metrics` facade. The library never installs a
//! recorder; embedders that want the numbers install their own exporter.

use crate::models::IdentityKind;

/// Record a successful model load
pub fn record_model_load(kind: IdentityKind) {
    metrics::counter!("fast_langdetect_model_loads_total",
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Record a failed model load
pub fn record_model_load_failure(kind: IdentityKind) {
    metrics::counter!("fast_langdetect_model_load_failures_total",
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Record an auto-tier switch from the full to the lite model
pub fn record_fallback() {
    metrics::counter!("fast_langdetect_fallbacks_total").increment(1);
}

/// Record an input cut to `max_input_length`
pub fn record_truncation() {
    metrics::counter!("fast_langdetect_truncations_total").increment(1);
}

/// Record a completed detection, labelled by the model that answered
pub fn record_detection(kind: IdentityKind) {
    metrics::counter!("fast_langdetect_detections_total",
        "tier" => kind.as_str()
    )
    .increment(1);
}

/// Record a full-model download that completed and verified
pub fn record_download() {
    metrics::counter!("fast_langdetect_downloads_total").increment(1);
}
