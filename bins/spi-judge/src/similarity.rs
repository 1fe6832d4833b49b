// Edit distance between reference and candidate sources
use spi_common::types::DistanceRecord;

/// Levenshtein distance from `a` to `b` over characters, normalized by the
/// length of `b`. An empty `b` has relative distance 0.
pub fn distance(a: &str, b: &str) -> DistanceRecord {
    let distance = strsim::levenshtein(a, b);
    let s2_len = b.chars().count();
    let relative_distance = if s2_len == 0 {
        0.0
    } else {
        distance as f64 / s2_len as f64
    };

    DistanceRecord {
        distance,
        s2_len,
        relative_distance,
    }
}
