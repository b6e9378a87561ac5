use crate::metric::HistogramValue;

const MIB: f64 = 1024.0 * 1024.0;

/// `count` bounds starting at `start`, each `width` above the previous one.
pub fn linear_buckets(start: f64, width: f64, count: usize) -> Vec<f64> {
    (0..count).map(|i| start + width * i as f64).collect()
}

/// Bounds used for the app flow histogram: 1 MiB, 6 MiB, ..., 46 MiB.
pub fn app_flow_buckets() -> Vec<f64> {
    linear_buckets(MIB, 5.0 * MIB, 10)
}

/// Per bound, 1 if `value` falls at or below it.
pub fn bucket_counts(bounds: &[f64], value: f64) -> Vec<(f64, u64)> {
    bounds
        .iter()
        .map(|&bound| (bound, u64::from(value <= bound)))
        .collect()
}

/// A histogram holding the single observation `value`.
pub fn observe(bounds: &[f64], value: f64) -> HistogramValue {
    HistogramValue {
        count: 1,
        sum: value,
        buckets: bucket_counts(bounds, value),
    }
}
