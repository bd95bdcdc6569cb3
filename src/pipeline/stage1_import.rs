use crate::config::RunParams;
use crate::error::{PipelineError, Result};
use crate::input::{Tube, load_experiment};
use crate::model::experiment::Experiment;

pub fn run_stage1(params: &RunParams) -> Result<Experiment> {
    let tubes: Vec<Tube> = params.tubes.iter().map(Tube::from).collect();
    let experiment = load_experiment(&tubes, &params.condition_name)?;
    check_channels(params, &experiment)?;
    tracing::info!(
        stage = "import",
        events = experiment.n_events(),
        channels = experiment.channels().len(),
        conditions = experiment.conditions().levels.len(),
        "experiment imported"
    );
    Ok(experiment)
}

/// Rejects configurations that name channels the instrument did not record,
/// or that would add columns clashing with recorded channels.
pub fn check_channels(params: &RunParams, experiment: &Experiment) -> Result<()> {
    for channel in params.referenced_channels() {
        experiment.channel_index(channel)?;
    }
    if experiment.has_channel(&params.condition_name) {
        return Err(PipelineError::params(format!(
            "condition name {} is also a channel name",
            params.condition_name
        )));
    }
    let gate_names = params
        .threshold_gate
        .iter()
        .map(|g| g.gate_name.as_str())
        .chain(params.quad_gate.iter().map(|g| g.gate_name.as_str()));
    for gate in gate_names {
        if experiment.has_channel(gate) {
            return Err(PipelineError::params(format!(
                "gate name {} is also a channel name",
                gate
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/stage1_import.rs"]
mod tests;
