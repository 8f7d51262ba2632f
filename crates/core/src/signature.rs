//! AI cache pattern signatures.
//!
//! A signature is a SHA-256 hex digest over a canonical serialization of
//! `(detection_type, severity, bucketized evidence counts)`. Numeric
//! evidence is discretized into ranges so similar-but-not-identical
//! incidents (say, 6 vs 9 failed logins from one IP) share one cached AI
//! response.

use std::collections::BTreeMap;

use crate::hashing::sha256_hex;
use crate::severity::Severity;

/// Discretize a count into its canonical bucket label.
pub fn bucketize(count: i64) -> &'static str {
    match count {
        i64::MIN..=1 => "1",
        2..=5 => "2-5",
        6..=10 => "6-10",
        11..=25 => "11-25",
        26..=50 => "26-50",
        51..=100 => "51-100",
        _ => "100+",
    }
}

/// Compute the pattern signature for a detection.
///
/// `counts` maps evidence field names (e.g. `event_count`, `unique_ips`) to
/// raw counts. A `BTreeMap` keeps the serialization order-independent of
/// the caller: the same fields always hash identically.
pub fn pattern_signature(
    detection_type: &str,
    severity: Severity,
    counts: &BTreeMap<String, i64>,
) -> String {
    let mut canonical = format!("{detection_type}|{}", severity.as_str());
    for (field, count) in counts {
        canonical.push('|');
        canonical.push_str(field);
        canonical.push('=');
        canonical.push_str(bucketize(*count));
    }
    sha256_hex(canonical.as_bytes())
}
