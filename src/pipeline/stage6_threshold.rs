use std::path::PathBuf;
use std::sync::Arc;

use crate::config::ThresholdGateSpec;
use crate::error::Result;
use crate::model::experiment::Experiment;
use crate::model::gates::ThresholdOp;
use crate::pipeline::{Stage, StageEnv};
use crate::render::views::threshold_view;
use crate::report::summary::ThresholdSummary;

#[derive(Debug, Clone)]
pub struct Stage6Output {
    pub experiment: Experiment,
    pub summary: Option<ThresholdSummary>,
    pub plot: Option<PathBuf>,
}

pub fn run_stage6(
    env: &StageEnv,
    experiment: &Experiment,
    stage: Stage<&ThresholdGateSpec>,
) -> Result<Stage6Output> {
    let Stage::Run(spec) = stage else {
        tracing::info!(stage = "threshold_gate", "skipped");
        return Ok(Stage6Output {
            experiment: experiment.clone(),
            summary: None,
            plot: None,
        });
    };

    let op = Arc::new(ThresholdOp {
        name: spec.gate_name.clone(),
        channel: spec.channel.clone(),
        threshold: spec.threshold,
    });

    let path = env.path("threshold_gate/threshold_plot.png");
    threshold_view(&env.plot, &path, experiment, &op)?;

    let next = experiment.apply(op.clone())?;
    let counts = op.counts(&next)?;
    tracing::info!(
        stage = "threshold_gate",
        gate = %op.name,
        below = counts.below,
        above = counts.above,
        "threshold gate applied"
    );
    Ok(Stage6Output {
        experiment: next,
        summary: Some(ThresholdSummary::new(&op, counts)),
        plot: Some(env.relative(&path)),
    })
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/stage6_threshold.rs"]
mod tests;
