use crate::error::{PipelineError, Result};
use crate::model::estimators::MixtureEstimator;
use crate::model::experiment::{Category, Experiment, LabelColumn, Operation};
use crate::model::gmm::MixtureModel;

pub const POPULATION_NAME: &str = "CellBulk";
pub const POPULATION_COMPONENTS: usize = 2;

/// Two-channel mixture gate separating the bulk cell population from debris.
///
/// The y channel is fitted on a log10 scale; events with a non-positive y
/// value cannot be placed on that scale and are left unassigned.
#[derive(Debug, Clone)]
pub struct GaussianMixtureOp {
    pub name: String,
    pub xchannel: String,
    pub ychannel: String,
    pub sigma: f64,
    pub model: MixtureModel,
    pub fitted_events: usize,
}

impl GaussianMixtureOp {
    pub fn estimate(
        experiment: &Experiment,
        name: &str,
        xchannel: &str,
        ychannel: &str,
        sigma: f64,
        estimator: &dyn MixtureEstimator,
        seed: u64,
    ) -> Result<Self> {
        let xs = experiment.channel(xchannel)?;
        let ys = experiment.channel(ychannel)?;
        let points: Vec<[f64; 2]> = xs
            .iter()
            .zip(ys)
            .filter_map(|(&x, &y)| scaled_point(x, y))
            .collect();
        let dropped = experiment.n_events() - points.len();
        if dropped > 0 {
            tracing::warn!(
                dropped,
                channel = ychannel,
                "events with non-positive values excluded from the log-scaled mixture fit"
            );
        }
        if points.is_empty() {
            return Err(PipelineError::estimation(format!(
                "no events with positive {} to fit the {} mixture",
                ychannel, name
            )));
        }
        let model = estimator.fit(&points, POPULATION_COMPONENTS, seed)?;
        Ok(Self {
            name: name.to_string(),
            xchannel: xchannel.to_string(),
            ychannel: ychannel.to_string(),
            sigma,
            model,
            fitted_events: points.len(),
        })
    }

    /// Name of the boolean membership column of component `k` (0-based).
    pub fn component_column(&self, k: usize) -> String {
        format!("{}_{}", self.name, k + 1)
    }

    /// Membership column of the component with the largest x mean.
    pub fn bulk_column(&self) -> String {
        self.component_column(self.model.components.len().saturating_sub(1))
    }
}

fn scaled_point(x: f64, y: f64) -> Option<[f64; 2]> {
    (x.is_finite() && y.is_finite() && y > 0.0).then(|| [x, y.log10()])
}

impl Operation for GaussianMixtureOp {
    fn name(&self) -> &str {
        &self.name
    }

    fn transform(&self, experiment: &Experiment) -> Result<Experiment> {
        let xs = experiment.channel(&self.xchannel)?;
        let ys = experiment.channel(&self.ychannel)?;
        let k = self.model.components.len();
        let n = experiment.n_events();
        let limit = self.sigma * self.sigma;

        let mut codes = Vec::with_capacity(n);
        let mut members = vec![vec![false; n]; k];
        for (i, (&x, &y)) in xs.iter().zip(ys).enumerate() {
            match scaled_point(x, y) {
                Some(p) => {
                    codes.push(Some(self.model.predict(p) as u32));
                    for (c, comp) in self.model.components.iter().enumerate() {
                        members[c][i] = comp.mahalanobis_sq(p) <= limit;
                    }
                }
                None => codes.push(None),
            }
        }

        let levels: Vec<String> = (0..k).map(|c| self.component_column(c)).collect();
        let mut next = experiment.with_label(LabelColumn::category(
            self.name.clone(),
            Category { levels, codes },
        ))?;
        for (c, flags) in members.into_iter().enumerate() {
            next = next.with_label(LabelColumn::flags(self.component_column(c), flags))?;
        }
        Ok(next)
    }
}

#[cfg(test)]
#[path = "../../tests/src_inline/model/population.rs"]
mod tests;
