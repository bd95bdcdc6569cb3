use std::path::PathBuf;

use crate::error::Result;
use crate::model::experiment::Experiment;
use crate::pipeline::StageEnv;
use crate::render::views::{condition_histograms, morphology_scatter};

#[derive(Debug, Clone)]
pub struct Stage2Output {
    pub scatterplot: PathBuf,
    pub histograms: Vec<PathBuf>,
    /// Relative paths of everything written.
    pub written: Vec<PathBuf>,
}

/// Baseline morphology scatter and one condition-faceted histogram per channel.
/// Reads the experiment only.
pub fn run_stage2(
    env: &StageEnv,
    experiment: &Experiment,
    morphology: &[String; 2],
) -> Result<Stage2Output> {
    let scatterplot = env.path("scatterplot.png");
    morphology_scatter(
        &env.plot,
        &scatterplot,
        experiment,
        &morphology[0],
        &morphology[1],
    )?;

    let histograms = condition_histograms(&env.plot, &env.path("histograms"), experiment)?;
    tracing::info!(
        stage = "views",
        histograms = histograms.len(),
        "rendered baseline views"
    );

    let mut written = vec![env.relative(&scatterplot)];
    written.extend(histograms.iter().map(|p| env.relative(p)));
    Ok(Stage2Output {
        scatterplot,
        histograms,
        written,
    })
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/stage2_views.rs"]
mod tests;
