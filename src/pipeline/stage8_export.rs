use std::path::PathBuf;

use crate::config::RunParams;
use crate::error::Result;
use crate::model::autofluorescence::AutofluorescenceOp;
use crate::model::bleedthrough::BleedthroughOp;
use crate::model::experiment::Experiment;
use crate::model::population::GaussianMixtureOp;
use crate::pipeline::StageEnv;
use crate::report::summary::{
    QuadSummary, RunSummary, ThresholdSummary, TubeSummary, write_run_summary,
};
use crate::report::tables::write_cell_matrix;

#[derive(Debug, Clone)]
pub struct Stage8Input<'a> {
    pub params: &'a RunParams,
    pub experiment: &'a Experiment,
    pub population: &'a GaussianMixtureOp,
    pub autofluorescence: Option<&'a AutofluorescenceOp>,
    pub bleedthrough: Option<&'a BleedthroughOp>,
    pub threshold: Option<ThresholdSummary>,
    pub quad: Option<QuadSummary>,
    /// Relative paths written by earlier stages.
    pub outputs: Vec<PathBuf>,
}

/// Always runs: the final snapshot as `cell_matrix.csv` plus `run_summary.json`.
pub fn run_stage8(env: &StageEnv, input: &Stage8Input<'_>) -> Result<RunSummary> {
    let matrix = env.path("cell_matrix.csv");
    write_cell_matrix(input.experiment, &matrix)?;

    let summary_path = env.path("run_summary.json");
    let mut outputs = input.outputs.clone();
    outputs.push(env.relative(&matrix));
    outputs.push(env.relative(&summary_path));

    let summary = build_summary(input, outputs);
    write_run_summary(&summary, &summary_path)?;
    tracing::info!(
        stage = "export",
        events = summary.n_events,
        files = summary.outputs.len(),
        "exported results"
    );
    Ok(summary)
}

fn build_summary(input: &Stage8Input<'_>, outputs: Vec<PathBuf>) -> RunSummary {
    let params = input.params;
    let experiment = input.experiment;
    let tubes = params
        .tubes
        .iter()
        .zip(experiment.tube_sizes())
        .map(|(tube, &events)| TubeSummary {
            file: tube.file.clone(),
            condition_value: tube.condition_value.clone(),
            events,
        })
        .collect();

    RunSummary {
        tool: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        experiment_name: params.experiment_name.clone(),
        condition_name: experiment.condition_name().to_string(),
        seed: params.seed,
        n_events: experiment.n_events(),
        channels: experiment.channels().to_vec(),
        tubes,
        population: input.population.into(),
        autofluorescence: input.autofluorescence.map(Into::into),
        bleedthrough: input.bleedthrough.map(Into::into),
        threshold_gate: input.threshold.clone(),
        quad_gate: input.quad.clone(),
        output_to_registry: params.output_to_registry.clone(),
        outputs,
    }
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/stage8_export.rs"]
mod tests;
