use std::path::PathBuf;
use std::sync::Arc;

use crate::config::RunParams;
use crate::error::Result;
use crate::model::experiment::Experiment;
use crate::model::gmm::EmMixture;
use crate::model::population::{GaussianMixtureOp, POPULATION_NAME};
use crate::pipeline::StageEnv;
use crate::render::views::population_scatter;

#[derive(Debug, Clone)]
pub struct Stage3Output {
    pub experiment: Experiment,
    pub op: Arc<GaussianMixtureOp>,
    /// Relative path of the membership plot.
    pub plot: PathBuf,
}

pub fn run_stage3(env: &StageEnv, experiment: &Experiment, params: &RunParams) -> Result<Stage3Output> {
    let [xchannel, ychannel] = &params.morphology_channels;
    let op = Arc::new(GaussianMixtureOp::estimate(
        experiment,
        POPULATION_NAME,
        xchannel,
        ychannel,
        params.population_sigma,
        &EmMixture::default(),
        params.seed,
    )?);
    let next = experiment.apply(op.clone())?;

    let bulk = op.bulk_column();
    let members = next.flag(&bulk)?.iter().filter(|&&m| m).count();
    tracing::info!(
        stage = "population",
        fitted = op.fitted_events,
        bulk = %bulk,
        members,
        log_likelihood = op.model.log_likelihood,
        "population identified"
    );

    let path = env.path("gaussian_plot.png");
    population_scatter(&env.plot, &path, &next, &op)?;

    Ok(Stage3Output {
        experiment: next,
        op,
        plot: env.relative(&path),
    })
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/stage3_population.rs"]
mod tests;
