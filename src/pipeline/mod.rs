use std::path::{Path, PathBuf};

use crate::config::RunParams;
use crate::error::Result;
use crate::model::experiment::Subset;
use crate::render::PlotContext;

pub mod stage1_import;
pub mod stage2_views;
pub mod stage3_population;
pub mod stage4_autofluorescence;
pub mod stage5_bleedthrough;
pub mod stage6_threshold;
pub mod stage7_quadrant;
pub mod stage8_export;

use stage1_import::run_stage1;
use stage2_views::run_stage2;
use stage3_population::run_stage3;
use stage4_autofluorescence::run_stage4;
use stage5_bleedthrough::run_stage5;
use stage6_threshold::run_stage6;
use stage7_quadrant::run_stage7;
use stage8_export::{Stage8Input, run_stage8};

/// An optional stage: either skipped (identity on the experiment) or run with
/// its configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Stage<C> {
    Skip,
    Run(C),
}

impl<C> From<Option<C>> for Stage<C> {
    fn from(value: Option<C>) -> Self {
        match value {
            Some(c) => Stage::Run(c),
            None => Stage::Skip,
        }
    }
}

/// Where a stage writes and how it draws.
#[derive(Debug, Clone)]
pub struct StageEnv {
    pub plot: PlotContext,
    pub out_dir: PathBuf,
}

impl StageEnv {
    pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.out_dir.join(relative)
    }

    /// `path` relative to the experiment directory, for the run summary.
    pub fn relative(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.out_dir)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

/// Runs every stage in order and returns the experiment output directory.
pub fn run_pipeline(params: &RunParams) -> Result<PathBuf> {
    params.validate()?;

    let env = StageEnv {
        plot: PlotContext::new(
            params.dpi,
            params.marker_size,
            params.marker_alpha,
            params.font.as_deref(),
        ),
        out_dir: params.experiment_dir(),
    };
    run_with_env(params, &env)?;
    Ok(env.out_dir)
}

pub(crate) fn run_with_env(params: &RunParams, env: &StageEnv) -> Result<()> {
    std::fs::create_dir_all(&env.out_dir)?;
    tracing::info!(
        experiment = %params.experiment_name,
        out = %env.out_dir.display(),
        tubes = params.tubes.len(),
        "starting pipeline"
    );

    let ex = run_stage1(params)?;
    let views = run_stage2(env, &ex, &params.morphology_channels)?;

    let population = run_stage3(env, &ex, params)?;
    let bulk = Subset::Flag(population.op.bulk_column());

    let af = run_stage4(
        env,
        &population.experiment,
        params.autofluorescence.as_ref().into(),
        &bulk,
    )?;
    let bl = run_stage5(
        env,
        &af.experiment,
        params
            .bleedthrough
            .as_deref()
            .filter(|controls| !controls.is_empty())
            .into(),
        &bulk,
    )?;
    let tv = run_stage6(env, &bl.experiment, params.threshold_gate.as_ref().into())?;
    let quad = run_stage7(env, &tv.experiment, params.quad_gate.as_ref().into())?;

    let mut outputs = views.written;
    outputs.push(population.plot.clone());
    outputs.extend(af.plot.iter().cloned());
    outputs.extend(bl.plot.iter().cloned());
    outputs.extend(tv.plot.iter().cloned());
    outputs.extend(quad.written.iter().cloned());

    run_stage8(
        env,
        &Stage8Input {
            params,
            experiment: &quad.experiment,
            population: &population.op,
            autofluorescence: af.op.as_deref(),
            bleedthrough: bl.op.as_deref(),
            threshold: tv.summary.clone(),
            quad: quad.summary.clone(),
            outputs,
        },
    )?;

    tracing::info!(out = %env.out_dir.display(), "pipeline finished");
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/mod.rs"]
mod tests;
