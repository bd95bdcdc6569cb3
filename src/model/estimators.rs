//! Numeric strategies behind the estimate phases. Each operation takes one of
//! these as a trait object so alternative estimators can be swapped in.

use crate::error::{PipelineError, Result};
use crate::model::gmm::MixtureModel;

pub trait MixtureEstimator: std::fmt::Debug + Send + Sync {
    /// Fits `k` two-dimensional components to `points`.
    fn fit(&self, points: &[[f64; 2]], k: usize, seed: u64) -> Result<MixtureModel>;
}

pub trait BackgroundEstimator: std::fmt::Debug + Send + Sync {
    /// Background level of one channel in a blank control.
    fn estimate(&self, values: &[f64]) -> Result<f64>;
}

pub trait SpilloverEstimator: std::fmt::Debug + Send + Sync {
    /// Fraction of `from` signal that appears in `to`.
    fn estimate(&self, from: &[f64], to: &[f64]) -> Result<f64>;
}

/// Arithmetic median of the finite values.
#[derive(Debug, Clone, Copy, Default)]
pub struct MedianBackground;

impl BackgroundEstimator for MedianBackground {
    fn estimate(&self, values: &[f64]) -> Result<f64> {
        median(values).ok_or_else(|| {
            PipelineError::estimation("no finite events available for background estimation")
        })
    }
}

pub fn median(values: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    if n % 2 == 1 {
        Some(sorted[n / 2])
    } else {
        Some((sorted[n / 2 - 1] + sorted[n / 2]) / 2.0)
    }
}

/// Least-squares slope of `to = m * from` with no intercept.
#[derive(Debug, Clone, Copy, Default)]
pub struct OriginLeastSquares;

impl SpilloverEstimator for OriginLeastSquares {
    fn estimate(&self, from: &[f64], to: &[f64]) -> Result<f64> {
        if from.len() != to.len() {
            return Err(PipelineError::estimation(
                "spillover inputs differ in length",
            ));
        }
        let mut sxx = 0.0f64;
        let mut sxy = 0.0f64;
        let mut n = 0usize;
        for (&x, &y) in from.iter().zip(to) {
            if x.is_finite() && y.is_finite() {
                sxx += x * x;
                sxy += x * y;
                n += 1;
            }
        }
        if n == 0 || sxx <= 0.0 {
            return Err(PipelineError::estimation(
                "single-colour control carries no signal in its own channel",
            ));
        }
        Ok(sxy / sxx)
    }
}

#[cfg(test)]
#[path = "../../tests/src_inline/model/estimators.rs"]
mod tests;
