use std::path::PathBuf;
use std::sync::Arc;

use crate::config::BleedthroughSpec;
use crate::error::Result;
use crate::input::read_control;
use crate::model::bleedthrough::{BleedthroughOp, ControlTube};
use crate::model::estimators::OriginLeastSquares;
use crate::model::experiment::{Experiment, Subset};
use crate::pipeline::{Stage, StageEnv};
use crate::render::views::bleedthrough_view;

#[derive(Debug, Clone)]
pub struct Stage5Output {
    pub experiment: Experiment,
    pub op: Option<Arc<BleedthroughOp>>,
    pub plot: Option<PathBuf>,
}

/// Estimates the spillover matrix from single-colour controls and compensates
/// every event. Runs after autofluorescence so controls are background-subtracted.
/// An empty control list is the same as no controls.
pub fn run_stage5(
    env: &StageEnv,
    experiment: &Experiment,
    stage: Stage<&[BleedthroughSpec]>,
    subset: &Subset,
) -> Result<Stage5Output> {
    let specs = match stage {
        Stage::Run(specs) if !specs.is_empty() => specs,
        _ => {
            tracing::info!(stage = "bleedthrough", "skipped");
            return Ok(Stage5Output {
                experiment: experiment.clone(),
                op: None,
                plot: None,
            });
        }
    };

    let controls = specs
        .iter()
        .map(|spec| {
            Ok(ControlTube {
                channel: spec.channel.clone(),
                file: spec.control_file.clone(),
                events: read_control(&spec.control_file, experiment)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let estimate = BleedthroughOp::estimate(experiment, controls, subset.clone(), &OriginLeastSquares)?;

    let path = env.path("bleedthrough/compensation_matrix.png");
    bleedthrough_view(&env.plot, &path, &estimate)?;

    let op = Arc::new(estimate.op);
    let next = experiment.apply(op.clone())?;
    tracing::info!(
        stage = "bleedthrough",
        channels = op.channels.len(),
        "bleedthrough compensated"
    );
    Ok(Stage5Output {
        experiment: next,
        op: Some(op),
        plot: Some(env.relative(&path)),
    })
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/stage5_bleedthrough.rs"]
mod tests;
