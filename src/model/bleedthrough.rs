use std::path::PathBuf;

use ndarray::Array2;

use crate::error::{PipelineError, Result};
use crate::model::estimators::SpilloverEstimator;
use crate::model::experiment::{Experiment, Operation, Subset};

pub const BLEEDTHROUGH_NAME: &str = "Bleedthrough";

const PANEL_POINTS: usize = 5_000;

/// Linear spillover compensation across a fixed set of channels.
///
/// `matrix[[i, j]]` is the fraction of channel `i` signal observed in channel
/// `j` (unit diagonal). An observed row vector `o` is compensated as
/// `o * matrix^-1`.
#[derive(Debug, Clone)]
pub struct BleedthroughOp {
    pub channels: Vec<String>,
    pub controls: Vec<PathBuf>,
    pub subset: Subset,
    pub matrix: Array2<f64>,
    inverse: Array2<f64>,
}

/// Control events behind one off-diagonal matrix entry.
#[derive(Debug, Clone)]
pub struct SpilloverPanel {
    pub from: String,
    pub to: String,
    pub from_values: Vec<f64>,
    pub to_values: Vec<f64>,
    pub slope: f64,
}

#[derive(Debug, Clone)]
pub struct BleedthroughEstimate {
    pub op: BleedthroughOp,
    pub panels: Vec<SpilloverPanel>,
}

pub struct ControlTube {
    pub channel: String,
    pub file: PathBuf,
    /// Raw import of the control file; the experiment history is replayed onto it.
    pub events: Experiment,
}

impl BleedthroughOp {
    pub fn estimate(
        experiment: &Experiment,
        controls: Vec<ControlTube>,
        subset: Subset,
        estimator: &dyn SpilloverEstimator,
    ) -> Result<BleedthroughEstimate> {
        let channels: Vec<String> = controls.iter().map(|c| c.channel.clone()).collect();
        for channel in &channels {
            experiment.channel_index(channel)?;
        }
        let n = channels.len();
        let mut matrix = Array2::<f64>::eye(n);
        let mut panels = Vec::with_capacity(n * n.saturating_sub(1));
        let mut files = Vec::with_capacity(n);

        for (i, control) in controls.into_iter().enumerate() {
            let processed = experiment.replay(control.events)?;
            let indices = processed.subset_indices(&subset)?;
            if indices.is_empty() {
                return Err(PipelineError::estimation(format!(
                    "control {} for {} has no events in subset {}",
                    control.file.display(),
                    control.channel,
                    subset
                )));
            }
            let from_col = processed.channel(&control.channel)?;
            let from: Vec<f64> = indices.iter().map(|&e| from_col[e]).collect();

            for (j, to_channel) in channels.iter().enumerate() {
                if i == j {
                    continue;
                }
                let to_col = processed.channel(to_channel)?;
                let to: Vec<f64> = indices.iter().map(|&e| to_col[e]).collect();
                let slope = estimator.estimate(&from, &to)?;
                tracing::info!(
                    from = %control.channel,
                    to = %to_channel,
                    slope,
                    "bleedthrough coefficient"
                );
                matrix[[i, j]] = slope;
                panels.push(SpilloverPanel {
                    from: control.channel.clone(),
                    to: to_channel.clone(),
                    from_values: thin(&from, PANEL_POINTS),
                    to_values: thin(&to, PANEL_POINTS),
                    slope,
                });
            }
            files.push(control.file);
        }

        let inverse = invert(&matrix).ok_or_else(|| {
            PipelineError::estimation("bleedthrough matrix is singular and cannot be inverted")
        })?;

        Ok(BleedthroughEstimate {
            op: BleedthroughOp {
                channels,
                controls: files,
                subset,
                matrix,
                inverse,
            },
            panels,
        })
    }

    pub fn inverse(&self) -> &Array2<f64> {
        &self.inverse
    }
}

impl Operation for BleedthroughOp {
    fn name(&self) -> &str {
        BLEEDTHROUGH_NAME
    }

    fn transform(&self, experiment: &Experiment) -> Result<Experiment> {
        let n_events = experiment.n_events();
        let n = self.channels.len();
        let mut observed = Array2::<f64>::zeros((n_events, n));
        for (j, channel) in self.channels.iter().enumerate() {
            for (e, &v) in experiment.channel(channel)?.iter().enumerate() {
                observed[[e, j]] = v;
            }
        }
        let compensated = observed.dot(&self.inverse);

        let mut next = experiment.clone();
        for (j, channel) in self.channels.iter().enumerate() {
            next = next.with_channel(channel, compensated.column(j).to_vec())?;
        }
        Ok(next)
    }
}

/// Gauss-Jordan inverse with partial pivoting.
pub fn invert(m: &Array2<f64>) -> Option<Array2<f64>> {
    let n = m.nrows();
    if n != m.ncols() {
        return None;
    }
    let mut a = m.clone();
    let mut inv = Array2::<f64>::eye(n);
    for col in 0..n {
        let pivot = (col..n).max_by(|&r1, &r2| a[[r1, col]].abs().total_cmp(&a[[r2, col]].abs()))?;
        let p = a[[pivot, col]];
        if !p.is_finite() || p.abs() < 1e-12 {
            return None;
        }
        if pivot != col {
            for j in 0..n {
                a.swap([pivot, j], [col, j]);
                inv.swap([pivot, j], [col, j]);
            }
        }
        for j in 0..n {
            a[[col, j]] /= p;
            inv[[col, j]] /= p;
        }
        for r in 0..n {
            if r == col {
                continue;
            }
            let f = a[[r, col]];
            if f == 0.0 {
                continue;
            }
            for j in 0..n {
                let (pa, pi) = (a[[col, j]], inv[[col, j]]);
                a[[r, j]] -= f * pa;
                inv[[r, j]] -= f * pi;
            }
        }
    }
    Some(inv)
}

fn thin(values: &[f64], max: usize) -> Vec<f64> {
    if values.len() <= max {
        return values.to_vec();
    }
    let step = values.len() as f64 / max as f64;
    (0..max)
        .map(|i| values[((i as f64 * step) as usize).min(values.len() - 1)])
        .collect()
}

#[cfg(test)]
#[path = "../../tests/src_inline/model/bleedthrough.rs"]
mod tests;
