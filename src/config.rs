use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::model::population::POPULATION_NAME;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TubeSpec {
    pub file: PathBuf,
    pub condition_value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AutofluorescenceSpec {
    pub blank_file: PathBuf,
    pub channels: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BleedthroughSpec {
    pub channel: String,
    pub control_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThresholdGateSpec {
    pub gate_name: String,
    pub channel: String,
    pub threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuadGateSpec {
    pub gate_name: String,
    pub xchannel: String,
    pub xthreshold: f64,
    pub ychannel: String,
    pub ythreshold: f64,
}

/// Full parameter set of one run, usually read from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunParams {
    pub experiment_name: String,
    pub tubes: Vec<TubeSpec>,
    pub condition_name: String,
    #[serde(default)]
    pub autofluorescence: Option<AutofluorescenceSpec>,
    #[serde(default)]
    pub bleedthrough: Option<Vec<BleedthroughSpec>>,
    #[serde(default)]
    pub threshold_gate: Option<ThresholdGateSpec>,
    #[serde(default)]
    pub quad_gate: Option<QuadGateSpec>,
    #[serde(default)]
    pub output_to_registry: Option<String>,
    pub output_directory: PathBuf,
    #[serde(default = "default_marker_size")]
    pub marker_size: f64,
    #[serde(default = "default_marker_alpha")]
    pub marker_alpha: f64,
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "default_morphology_channels")]
    pub morphology_channels: [String; 2],
    #[serde(default = "default_population_sigma")]
    pub population_sigma: f64,
    #[serde(default = "default_dpi")]
    pub dpi: u32,
    #[serde(default)]
    pub font: Option<PathBuf>,
}

fn default_marker_size() -> f64 {
    0.5
}

fn default_marker_alpha() -> f64 {
    0.7
}

fn default_morphology_channels() -> [String; 2] {
    ["FSC-A".to_string(), "SSC-A".to_string()]
}

fn default_population_sigma() -> f64 {
    2.0
}

fn default_dpi() -> u32 {
    150
}

impl RunParams {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let params: RunParams = serde_json::from_str(&text)?;
        Ok(params)
    }

    /// Root of everything this run writes: `<output_directory>/<experiment_name>`.
    pub fn experiment_dir(&self) -> PathBuf {
        self.output_directory.join(&self.experiment_name)
    }

    /// Checks everything that can be checked without reading event data.
    pub fn validate(&self) -> Result<()> {
        let name = self.experiment_name.trim();
        if name.is_empty() {
            return Err(PipelineError::params("experiment_name is empty"));
        }
        if name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(PipelineError::params(format!(
                "experiment_name must be a single directory name, got {:?}",
                self.experiment_name
            )));
        }
        if self.condition_name.trim().is_empty() {
            return Err(PipelineError::params("condition_name is empty"));
        }
        if self.tubes.is_empty() {
            return Err(PipelineError::params("at least one tube is required"));
        }
        if !(self.marker_alpha.is_finite() && (0.0..=1.0).contains(&self.marker_alpha)) {
            return Err(PipelineError::params(format!(
                "marker_alpha must be within [0, 1], got {}",
                self.marker_alpha
            )));
        }
        if !(self.marker_size.is_finite() && self.marker_size > 0.0) {
            return Err(PipelineError::params(format!(
                "marker_size must be positive, got {}",
                self.marker_size
            )));
        }
        if !(self.population_sigma.is_finite() && self.population_sigma > 0.0) {
            return Err(PipelineError::params(format!(
                "population_sigma must be positive, got {}",
                self.population_sigma
            )));
        }
        if self.dpi == 0 {
            return Err(PipelineError::params("dpi must be positive"));
        }
        if self.morphology_channels[0] == self.morphology_channels[1] {
            return Err(PipelineError::params(
                "morphology_channels must name two different channels",
            ));
        }

        for tube in &self.tubes {
            require_file(&tube.file)?;
        }

        if let Some(af) = &self.autofluorescence {
            require_file(&af.blank_file)?;
            if af.channels.is_empty() {
                return Err(PipelineError::params(
                    "autofluorescence requires at least one channel",
                ));
            }
        }

        if let Some(controls) = &self.bleedthrough {
            let mut seen = BTreeSet::new();
            for control in controls {
                if !seen.insert(control.channel.as_str()) {
                    return Err(PipelineError::params(format!(
                        "duplicate bleedthrough channel {}",
                        control.channel
                    )));
                }
                require_file(&control.control_file)?;
            }
        }

        let mut gate_names = BTreeSet::new();
        if let Some(gate) = &self.threshold_gate {
            require_finite(&gate.gate_name, gate.threshold)?;
            gate_names.insert(gate.gate_name.as_str());
        }
        if let Some(gate) = &self.quad_gate {
            require_finite(&gate.gate_name, gate.xthreshold)?;
            require_finite(&gate.gate_name, gate.ythreshold)?;
            if !gate_names.insert(gate.gate_name.as_str()) {
                return Err(PipelineError::params(format!(
                    "threshold and quadrant gates share the name {}",
                    gate.gate_name
                )));
            }
        }
        for gate in gate_names {
            if gate.trim().is_empty() {
                return Err(PipelineError::params("gate_name is empty"));
            }
            if gate == self.condition_name || gate.starts_with(POPULATION_NAME) {
                return Err(PipelineError::params(format!(
                    "gate name {} collides with an existing column",
                    gate
                )));
            }
        }

        Ok(())
    }

    /// Every channel name the configuration refers to, in first-seen order.
    pub fn referenced_channels(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for name in &self.morphology_channels {
            push_unique(&mut out, name);
        }
        if let Some(af) = &self.autofluorescence {
            for name in &af.channels {
                push_unique(&mut out, name);
            }
        }
        if let Some(controls) = &self.bleedthrough {
            for control in controls {
                push_unique(&mut out, &control.channel);
            }
        }
        if let Some(gate) = &self.threshold_gate {
            push_unique(&mut out, &gate.channel);
        }
        if let Some(gate) = &self.quad_gate {
            push_unique(&mut out, &gate.xchannel);
            push_unique(&mut out, &gate.ychannel);
        }
        out
    }
}

fn push_unique<'a>(out: &mut Vec<&'a str>, name: &'a str) {
    if !out.contains(&name) {
        out.push(name);
    }
}

fn require_file(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(PipelineError::import(path, "file does not exist or is not a regular file"))
    }
}

fn require_finite(gate: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(PipelineError::params(format!(
            "gate {} has a non-finite threshold",
            gate
        )))
    }
}

#[cfg(test)]
#[path = "../tests/src_inline/config.rs"]
mod tests;
