use std::path::PathBuf;

use crate::error::{PipelineError, Result};
use crate::model::estimators::BackgroundEstimator;
use crate::model::experiment::{Experiment, Operation, Subset};

pub const AUTOFLUORESCENCE_NAME: &str = "Autofluorescence";

/// Per-channel background subtraction estimated from a blank control.
#[derive(Debug, Clone)]
pub struct AutofluorescenceOp {
    pub blank_file: PathBuf,
    pub subset: Subset,
    /// `(channel, background)` in configured order.
    pub backgrounds: Vec<(String, f64)>,
}

/// Estimated operation plus the blank events used, kept for the diagnostic plot.
#[derive(Debug, Clone)]
pub struct AutofluorescenceEstimate {
    pub op: AutofluorescenceOp,
    pub blank_values: Vec<Vec<f64>>,
}

impl AutofluorescenceOp {
    /// `blank` is the raw imported blank tube; it receives the experiment's
    /// history before `subset` is evaluated on it.
    pub fn estimate(
        experiment: &Experiment,
        blank: Experiment,
        blank_file: PathBuf,
        channels: &[String],
        subset: Subset,
        estimator: &dyn BackgroundEstimator,
    ) -> Result<AutofluorescenceEstimate> {
        let blank = experiment.replay(blank)?;
        let indices = blank.subset_indices(&subset)?;
        if indices.is_empty() {
            return Err(PipelineError::estimation(format!(
                "blank control {} has no events in subset {}",
                blank_file.display(),
                subset
            )));
        }
        tracing::info!(
            events = indices.len(),
            total = blank.n_events(),
            subset = %subset,
            "estimating autofluorescence from blank control"
        );

        let mut backgrounds = Vec::with_capacity(channels.len());
        let mut blank_values = Vec::with_capacity(channels.len());
        for channel in channels {
            experiment.channel_index(channel)?;
            let column = blank.channel(channel)?;
            let values: Vec<f64> = indices.iter().map(|&i| column[i]).collect();
            let background = estimator.estimate(&values)?;
            tracing::info!(channel = %channel, background, "autofluorescence background");
            backgrounds.push((channel.clone(), background));
            blank_values.push(values);
        }

        Ok(AutofluorescenceEstimate {
            op: AutofluorescenceOp {
                blank_file,
                subset,
                backgrounds,
            },
            blank_values,
        })
    }
}

impl Operation for AutofluorescenceOp {
    fn name(&self) -> &str {
        AUTOFLUORESCENCE_NAME
    }

    fn transform(&self, experiment: &Experiment) -> Result<Experiment> {
        let mut next = experiment.clone();
        for (channel, background) in &self.backgrounds {
            let corrected: Vec<f64> = next
                .channel(channel)?
                .iter()
                .map(|v| v - background)
                .collect();
            next = next.with_channel(channel, corrected)?;
        }
        Ok(next)
    }
}

#[cfg(test)]
#[path = "../../tests/src_inline/model/autofluorescence.rs"]
mod tests;
