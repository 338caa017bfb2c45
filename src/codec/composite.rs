//! Quantities derived from decoded results
//!
//! Composites only exist when both constituents do.

/// Entangled modulus contribution: total minus phantom.
pub fn entangled(total: Option<f64>, phantom: Option<f64>) -> Option<f64> {
    Some(total? - phantom?)
}

/// Weight fraction of the load-bearing network.
pub fn backbone(dangling: Option<f64>, soluble: Option<f64>) -> Option<f64> {
    Some(1.0 - dangling? - soluble?)
}
