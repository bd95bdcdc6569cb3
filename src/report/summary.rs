use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::Result;
use crate::model::autofluorescence::AutofluorescenceOp;
use crate::model::bleedthrough::BleedthroughOp;
use crate::model::gates::{QuadOp, QuadrantStats, ThresholdCounts, ThresholdOp};
use crate::model::gmm::Gaussian2;
use crate::model::population::GaussianMixtureOp;

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub tool: String,
    pub version: String,
    pub experiment_name: String,
    pub condition_name: String,
    pub seed: u64,
    pub n_events: usize,
    pub channels: Vec<String>,
    pub tubes: Vec<TubeSummary>,
    pub population: PopulationSummary,
    pub autofluorescence: Option<AutofluorescenceSummary>,
    pub bleedthrough: Option<BleedthroughSummary>,
    pub threshold_gate: Option<ThresholdSummary>,
    pub quad_gate: Option<QuadSummary>,
    pub output_to_registry: Option<String>,
    /// Files written by the run, relative to the experiment directory.
    pub outputs: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TubeSummary {
    pub file: PathBuf,
    pub condition_value: String,
    pub events: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PopulationSummary {
    pub name: String,
    pub xchannel: String,
    pub ychannel: String,
    pub sigma: f64,
    pub bulk_column: String,
    pub fitted_events: usize,
    pub log_likelihood: f64,
    pub iterations: usize,
    pub converged: bool,
    pub components: Vec<Gaussian2>,
}

impl From<&GaussianMixtureOp> for PopulationSummary {
    fn from(op: &GaussianMixtureOp) -> Self {
        PopulationSummary {
            name: op.name.clone(),
            xchannel: op.xchannel.clone(),
            ychannel: op.ychannel.clone(),
            sigma: op.sigma,
            bulk_column: op.bulk_column(),
            fitted_events: op.fitted_events,
            log_likelihood: op.model.log_likelihood,
            iterations: op.model.iterations,
            converged: op.model.converged,
            components: op.model.components.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AutofluorescenceSummary {
    pub blank_file: PathBuf,
    pub subset: String,
    pub backgrounds: Vec<ChannelValue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelValue {
    pub channel: String,
    pub value: f64,
}

impl From<&AutofluorescenceOp> for AutofluorescenceSummary {
    fn from(op: &AutofluorescenceOp) -> Self {
        AutofluorescenceSummary {
            blank_file: op.blank_file.clone(),
            subset: op.subset.to_string(),
            backgrounds: op
                .backgrounds
                .iter()
                .map(|(channel, value)| ChannelValue {
                    channel: channel.clone(),
                    value: *value,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BleedthroughSummary {
    pub channels: Vec<String>,
    pub controls: Vec<PathBuf>,
    pub subset: String,
    /// Row `i`, column `j`: fraction of channel `i` signal seen in channel `j`.
    pub matrix: Vec<Vec<f64>>,
}

impl From<&BleedthroughOp> for BleedthroughSummary {
    fn from(op: &BleedthroughOp) -> Self {
        BleedthroughSummary {
            channels: op.channels.clone(),
            controls: op.controls.clone(),
            subset: op.subset.to_string(),
            matrix: op.matrix.rows().into_iter().map(|r| r.to_vec()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ThresholdSummary {
    pub gate_name: String,
    pub channel: String,
    pub threshold: f64,
    pub counts: ThresholdCounts,
}

impl ThresholdSummary {
    pub fn new(op: &ThresholdOp, counts: ThresholdCounts) -> Self {
        ThresholdSummary {
            gate_name: op.name.clone(),
            channel: op.channel.clone(),
            threshold: op.threshold,
            counts,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QuadSummary {
    pub gate_name: String,
    pub xchannel: String,
    pub xthreshold: f64,
    pub ychannel: String,
    pub ythreshold: f64,
    pub statistics: QuadrantStats,
}

impl QuadSummary {
    pub fn new(op: &QuadOp, statistics: QuadrantStats) -> Self {
        QuadSummary {
            gate_name: op.name.clone(),
            xchannel: op.xchannel.clone(),
            xthreshold: op.xthreshold,
            ychannel: op.ychannel.clone(),
            ythreshold: op.ythreshold,
            statistics,
        }
    }
}

pub fn write_run_summary(summary: &RunSummary, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut w = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut w, summary)?;
    w.write_all(b"\n")?;
    w.flush()?;
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/src_inline/report/summary.rs"]
mod tests;
