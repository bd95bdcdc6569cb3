use std::path::PathBuf;
use std::sync::Arc;

use crate::config::AutofluorescenceSpec;
use crate::error::Result;
use crate::input::read_control;
use crate::model::autofluorescence::AutofluorescenceOp;
use crate::model::estimators::MedianBackground;
use crate::model::experiment::{Experiment, Subset};
use crate::pipeline::{Stage, StageEnv};
use crate::render::views::autofluorescence_view;

#[derive(Debug, Clone)]
pub struct Stage4Output {
    pub experiment: Experiment,
    pub op: Option<Arc<AutofluorescenceOp>>,
    pub plot: Option<PathBuf>,
}

/// Subtracts the blank-control background of each configured channel. A
/// skipped stage hands the experiment through untouched.
pub fn run_stage4(
    env: &StageEnv,
    experiment: &Experiment,
    stage: Stage<&AutofluorescenceSpec>,
    subset: &Subset,
) -> Result<Stage4Output> {
    let Stage::Run(spec) = stage else {
        tracing::info!(stage = "autofluorescence", "skipped");
        return Ok(Stage4Output {
            experiment: experiment.clone(),
            op: None,
            plot: None,
        });
    };

    let blank = read_control(&spec.blank_file, experiment)?;
    let estimate = AutofluorescenceOp::estimate(
        experiment,
        blank,
        spec.blank_file.clone(),
        &spec.channels,
        subset.clone(),
        &MedianBackground,
    )?;

    let path = env.path("autofluorescence/histograms.png");
    autofluorescence_view(&env.plot, &path, &estimate)?;

    let op = Arc::new(estimate.op);
    let next = experiment.apply(op.clone())?;
    tracing::info!(
        stage = "autofluorescence",
        channels = op.backgrounds.len(),
        "autofluorescence subtracted"
    );
    Ok(Stage4Output {
        experiment: next,
        op: Some(op),
        plot: Some(env.relative(&path)),
    })
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/stage4_autofluorescence.rs"]
mod tests;
