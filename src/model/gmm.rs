use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::error::{PipelineError, Result};
use crate::model::estimators::MixtureEstimator;

const LN_2PI: f64 = 1.837_877_066_409_345_3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Gaussian2 {
    pub weight: f64,
    pub mean: [f64; 2],
    pub cov: [[f64; 2]; 2],
}

impl Gaussian2 {
    fn det(&self) -> f64 {
        self.cov[0][0] * self.cov[1][1] - self.cov[0][1] * self.cov[1][0]
    }

    fn precision(&self) -> Option<[[f64; 2]; 2]> {
        let det = self.det();
        if !(det.is_finite() && det > 0.0) {
            return None;
        }
        Some([
            [self.cov[1][1] / det, -self.cov[0][1] / det],
            [-self.cov[1][0] / det, self.cov[0][0] / det],
        ])
    }

    /// Squared Mahalanobis distance of `p` from the component mean.
    pub fn mahalanobis_sq(&self, p: [f64; 2]) -> f64 {
        let Some(prec) = self.precision() else {
            return f64::INFINITY;
        };
        quad_form(&prec, [p[0] - self.mean[0], p[1] - self.mean[1]])
    }

    pub fn log_pdf(&self, p: [f64; 2]) -> f64 {
        let det = self.det();
        if !(det.is_finite() && det > 0.0) {
            return f64::NEG_INFINITY;
        }
        -LN_2PI - 0.5 * det.ln() - 0.5 * self.mahalanobis_sq(p)
    }
}

fn quad_form(m: &[[f64; 2]; 2], d: [f64; 2]) -> f64 {
    d[0] * (m[0][0] * d[0] + m[0][1] * d[1]) + d[1] * (m[1][0] * d[0] + m[1][1] * d[1])
}

/// Fitted mixture; components are ordered by the mean of the first axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MixtureModel {
    pub components: Vec<Gaussian2>,
    pub log_likelihood: f64,
    pub iterations: usize,
    pub converged: bool,
}

impl MixtureModel {
    /// Index of the most probable component.
    pub fn predict(&self, p: [f64; 2]) -> usize {
        let mut best = 0usize;
        let mut best_score = f64::NEG_INFINITY;
        for (k, comp) in self.components.iter().enumerate() {
            let score = comp.weight.ln() + comp.log_pdf(p);
            if score > best_score {
                best_score = score;
                best = k;
            }
        }
        best
    }
}

/// Expectation-maximisation with full covariances, seeded k-means++ start.
#[derive(Debug, Clone)]
pub struct EmMixture {
    pub max_iter: usize,
    pub tol: f64,
    pub reg_covar: f64,
    pub kmeans_iter: usize,
}

impl Default for EmMixture {
    fn default() -> Self {
        Self {
            max_iter: 100,
            tol: 1e-3,
            reg_covar: 1e-6,
            kmeans_iter: 20,
        }
    }
}

impl MixtureEstimator for EmMixture {
    fn fit(&self, points: &[[f64; 2]], k: usize, seed: u64) -> Result<MixtureModel> {
        if k == 0 {
            return Err(PipelineError::estimation("mixture needs at least one component"));
        }
        if points.len() <= k {
            return Err(PipelineError::estimation(format!(
                "mixture with {} components needs more than {} events, got {}",
                k,
                k,
                points.len()
            )));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let centers = kmeans_plus_plus(points, k, &mut rng)?;
        let labels = lloyd(points, centers, self.kmeans_iter);

        let n = points.len();
        let mut resp = vec![0.0f64; n * k];
        for (i, &label) in labels.iter().enumerate() {
            resp[i * k + label] = 1.0;
        }
        let mut components = self.m_step(points, &resp, k)?;

        let mut prev_ll = f64::NEG_INFINITY;
        let mut log_likelihood = f64::NEG_INFINITY;
        let mut converged = false;
        let mut iterations = 0usize;
        for iter in 1..=self.max_iter {
            iterations = iter;
            log_likelihood = e_step(points, &components, &mut resp);
            if !log_likelihood.is_finite() {
                return Err(PipelineError::estimation(
                    "mixture log-likelihood became non-finite",
                ));
            }
            components = self.m_step(points, &resp, k)?;
            if (log_likelihood - prev_ll).abs() < self.tol {
                converged = true;
                break;
            }
            prev_ll = log_likelihood;
        }
        if !converged {
            tracing::warn!(
                iterations,
                "mixture fit did not converge; using the last estimate"
            );
        }

        components.sort_by(|a, b| a.mean[0].total_cmp(&b.mean[0]));
        Ok(MixtureModel {
            components,
            log_likelihood,
            iterations,
            converged,
        })
    }
}

impl EmMixture {
    fn m_step(&self, points: &[[f64; 2]], resp: &[f64], k: usize) -> Result<Vec<Gaussian2>> {
        let n = points.len();
        let mut out = Vec::with_capacity(k);
        for c in 0..k {
            let mut nk = 0.0f64;
            let mut sx = 0.0f64;
            let mut sy = 0.0f64;
            for (i, p) in points.iter().enumerate() {
                let r = resp[i * k + c];
                nk += r;
                sx += r * p[0];
                sy += r * p[1];
            }
            if nk < 1e-10 {
                return Err(PipelineError::estimation(format!(
                    "mixture component {} collapsed to zero weight",
                    c + 1
                )));
            }
            let mean = [sx / nk, sy / nk];
            let mut cov = [[0.0f64; 2]; 2];
            for (i, p) in points.iter().enumerate() {
                let r = resp[i * k + c];
                let dx = p[0] - mean[0];
                let dy = p[1] - mean[1];
                cov[0][0] += r * dx * dx;
                cov[0][1] += r * dx * dy;
                cov[1][1] += r * dy * dy;
            }
            cov[0][0] = cov[0][0] / nk + self.reg_covar;
            cov[1][1] = cov[1][1] / nk + self.reg_covar;
            cov[0][1] /= nk;
            cov[1][0] = cov[0][1];
            let comp = Gaussian2 {
                weight: nk / n as f64,
                mean,
                cov,
            };
            if comp.precision().is_none() {
                return Err(PipelineError::estimation(format!(
                    "mixture component {} has a singular covariance",
                    c + 1
                )));
            }
            out.push(comp);
        }
        Ok(out)
    }
}

/// Fills `resp` with posterior probabilities; returns the mean log-likelihood.
fn e_step(points: &[[f64; 2]], components: &[Gaussian2], resp: &mut [f64]) -> f64 {
    let k = components.len();
    let log_weights: Vec<f64> = components.iter().map(|c| c.weight.ln()).collect();
    let mut total = 0.0f64;
    let mut scores = vec![0.0f64; k];
    for (i, &p) in points.iter().enumerate() {
        let mut max = f64::NEG_INFINITY;
        for (c, comp) in components.iter().enumerate() {
            scores[c] = log_weights[c] + comp.log_pdf(p);
            max = max.max(scores[c]);
        }
        let sum: f64 = scores.iter().map(|s| (s - max).exp()).sum();
        let log_norm = max + sum.ln();
        total += log_norm;
        for c in 0..k {
            resp[i * k + c] = (scores[c] - log_norm).exp();
        }
    }
    total / points.len() as f64
}

fn dist_sq(a: [f64; 2], b: [f64; 2]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    dx * dx + dy * dy
}

fn kmeans_plus_plus(points: &[[f64; 2]], k: usize, rng: &mut StdRng) -> Result<Vec<[f64; 2]>> {
    let mut centers = Vec::with_capacity(k);
    centers.push(points[rng.random_range(0..points.len())]);
    let mut d2: Vec<f64> = points.iter().map(|&p| dist_sq(p, centers[0])).collect();
    while centers.len() < k {
        let total: f64 = d2.iter().sum();
        if !(total > 0.0 && total.is_finite()) {
            return Err(PipelineError::estimation(
                "events are not distinct enough to seed the mixture",
            ));
        }
        let mut target = rng.random::<f64>() * total;
        let mut chosen = points.len() - 1;
        for (i, &d) in d2.iter().enumerate() {
            if target < d {
                chosen = i;
                break;
            }
            target -= d;
        }
        let center = points[chosen];
        centers.push(center);
        for (i, &p) in points.iter().enumerate() {
            d2[i] = d2[i].min(dist_sq(p, center));
        }
    }
    Ok(centers)
}

fn lloyd(points: &[[f64; 2]], mut centers: Vec<[f64; 2]>, max_iter: usize) -> Vec<usize> {
    let k = centers.len();
    let mut labels = vec![0usize; points.len()];
    for _ in 0..max_iter.max(1) {
        let mut changed = false;
        for (i, &p) in points.iter().enumerate() {
            let mut best = 0usize;
            let mut best_d = f64::INFINITY;
            for (c, &center) in centers.iter().enumerate() {
                let d = dist_sq(p, center);
                if d < best_d {
                    best_d = d;
                    best = c;
                }
            }
            if labels[i] != best {
                labels[i] = best;
                changed = true;
            }
        }
        let mut sums = vec![[0.0f64; 2]; k];
        let mut counts = vec![0usize; k];
        for (i, &p) in points.iter().enumerate() {
            sums[labels[i]][0] += p[0];
            sums[labels[i]][1] += p[1];
            counts[labels[i]] += 1;
        }
        for c in 0..k {
            if counts[c] > 0 {
                centers[c] = [sums[c][0] / counts[c] as f64, sums[c][1] / counts[c] as f64];
            }
        }
        if !changed {
            break;
        }
    }
    labels
}

#[cfg(test)]
#[path = "../../tests/src_inline/model/gmm.rs"]
mod tests;
