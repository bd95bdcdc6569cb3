use std::path::{Path, PathBuf};

pub mod fcs;

use fcs::{FcsFile, read_fcs};

use crate::config::TubeSpec;
use crate::error::{PipelineError, Result};
use crate::model::experiment::{Category, Experiment};

/// One physical sample: an FCS file tagged with its condition value.
#[derive(Debug, Clone, PartialEq)]
pub struct Tube {
    pub file: PathBuf,
    pub condition_value: String,
}

impl From<&TubeSpec> for Tube {
    fn from(spec: &TubeSpec) -> Self {
        Tube {
            file: spec.file.clone(),
            condition_value: spec.condition_value.clone(),
        }
    }
}

/// Imports every tube into one experiment. The channel set comes from the
/// first tube; later tubes must carry all of those channels. Condition values
/// are kept as strings, with levels in first-seen order.
pub fn load_experiment(tubes: &[Tube], condition_name: &str) -> Result<Experiment> {
    let Some(first) = tubes.first() else {
        return Err(PipelineError::params("no tubes to import"));
    };

    let first_file = read_fcs(&first.file)?;
    let channels = first_file.meta.channel_names();
    tracing::info!(
        file = %first.file.display(),
        channels = channels.len(),
        "discovered channel set"
    );

    let mut data: Vec<Vec<f64>> = vec![Vec::new(); channels.len()];
    let mut levels: Vec<String> = Vec::new();
    let mut codes: Vec<Option<u32>> = Vec::new();
    let mut tube_sizes = Vec::with_capacity(tubes.len());

    let mut pending = Some(first_file);
    for tube in tubes {
        let file = match pending.take() {
            Some(f) => f,
            None => read_fcs(&tube.file)?,
        };
        let columns = select_channels(&file, &channels, &tube.file)?;
        let n_events = file.meta.n_events;

        let code = match levels.iter().position(|l| *l == tube.condition_value) {
            Some(idx) => idx,
            None => {
                levels.push(tube.condition_value.clone());
                levels.len() - 1
            }
        } as u32;
        codes.extend(std::iter::repeat_n(Some(code), n_events));
        for (dst, src) in data.iter_mut().zip(columns) {
            dst.extend(src);
        }
        tube_sizes.push(n_events);

        tracing::info!(
            file = %tube.file.display(),
            events = n_events,
            condition = %tube.condition_value,
            "imported tube"
        );
    }

    Experiment::new(
        channels,
        data,
        condition_name.to_string(),
        Category { levels, codes },
        tube_sizes,
    )
}

/// Imports a control file (blank or single-colour) onto the channel set of
/// `experiment`. Control events carry no condition value.
pub fn read_control(path: &Path, experiment: &Experiment) -> Result<Experiment> {
    let file = read_fcs(path)?;
    let channels = experiment.channels().to_vec();
    let columns = select_channels(&file, &channels, path)?;
    let n_events = file.meta.n_events;
    tracing::info!(file = %path.display(), events = n_events, "imported control");
    Experiment::new(
        channels,
        columns,
        experiment.condition_name().to_string(),
        Category {
            levels: Vec::new(),
            codes: vec![None; n_events],
        },
        vec![n_events],
    )
}

fn select_channels(file: &FcsFile, channels: &[String], path: &Path) -> Result<Vec<Vec<f64>>> {
    let names = file.meta.channel_names();
    let extra: Vec<&String> = names.iter().filter(|n| !channels.contains(n)).collect();
    if !extra.is_empty() {
        tracing::warn!(
            file = %path.display(),
            dropped = ?extra,
            "channels not present in the first tube are ignored"
        );
    }
    let mut out = Vec::with_capacity(channels.len());
    for channel in channels {
        let idx = names.iter().position(|n| n == channel).ok_or_else(|| {
            PipelineError::import(path, format!("missing channel {}", channel))
        })?;
        out.push(file.columns[idx].clone());
    }
    Ok(out)
}

#[cfg(test)]
#[path = "../../tests/src_inline/input/tests.rs"]
mod tests;
