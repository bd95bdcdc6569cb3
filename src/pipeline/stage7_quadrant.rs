use std::path::PathBuf;
use std::sync::Arc;

use crate::config::QuadGateSpec;
use crate::error::Result;
use crate::model::experiment::Experiment;
use crate::model::gates::QuadOp;
use crate::pipeline::{Stage, StageEnv};
use crate::render::views::quadrant_view;
use crate::report::summary::QuadSummary;
use crate::report::tables::write_quadrant_statistics;

#[derive(Debug, Clone)]
pub struct Stage7Output {
    pub experiment: Experiment,
    pub summary: Option<QuadSummary>,
    /// Relative paths of the plot and statistics table.
    pub written: Vec<PathBuf>,
}

pub fn run_stage7(
    env: &StageEnv,
    experiment: &Experiment,
    stage: Stage<&QuadGateSpec>,
) -> Result<Stage7Output> {
    let Stage::Run(spec) = stage else {
        tracing::info!(stage = "quad_gate", "skipped");
        return Ok(Stage7Output {
            experiment: experiment.clone(),
            summary: None,
            written: Vec::new(),
        });
    };

    let op = Arc::new(QuadOp {
        name: spec.gate_name.clone(),
        xchannel: spec.xchannel.clone(),
        xthreshold: spec.xthreshold,
        ychannel: spec.ychannel.clone(),
        ythreshold: spec.ythreshold,
    });
    let next = experiment.apply(op.clone())?;
    let stats = op.statistics(&next)?;
    for row in &stats.rows {
        tracing::info!(
            stage = "quad_gate",
            quadrant = row.quadrant,
            label = %row.quadrant_name,
            cells = row.cells,
            percent = row.percent,
            "quadrant count"
        );
    }

    let plot = env.path("quadrant_gate/scatterplot.png");
    quadrant_view(&env.plot, &plot, &next, &op, &stats)?;
    let table = env.path("quadrant_gate/quadrant_statistics.csv");
    write_quadrant_statistics(&stats, &table)?;

    Ok(Stage7Output {
        experiment: next,
        summary: Some(QuadSummary::new(&op, stats)),
        written: vec![env.relative(&plot), env.relative(&table)],
    })
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/stage7_quadrant.rs"]
mod tests;
