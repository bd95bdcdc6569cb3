use serde::Serialize;

use crate::error::{PipelineError, Result};
use crate::model::experiment::{Category, Experiment, LabelColumn, Operation};

/// Binary split of one channel: `true` when the value is at or above the threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdOp {
    pub name: String,
    pub channel: String,
    pub threshold: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThresholdCounts {
    pub below: usize,
    pub above: usize,
}

impl ThresholdOp {
    /// Per-label event counts of an experiment this gate has been applied to.
    pub fn counts(&self, experiment: &Experiment) -> Result<ThresholdCounts> {
        let flags = experiment.flag(&self.name)?;
        let above = flags.iter().filter(|&&f| f).count();
        Ok(ThresholdCounts {
            below: flags.len() - above,
            above,
        })
    }
}

impl Operation for ThresholdOp {
    fn name(&self) -> &str {
        &self.name
    }

    fn transform(&self, experiment: &Experiment) -> Result<Experiment> {
        let values = experiment.channel(&self.channel)?;
        let flags = values.iter().map(|&v| v >= self.threshold).collect();
        experiment.with_label(LabelColumn::flags(self.name.clone(), flags))
    }
}

/// The four quadrants in label order: Q1 upper-left, Q2 upper-right,
/// Q3 lower-left, Q4 lower-right (origin at the bottom-left).
pub const QUADRANTS: [&str; 4] = ["Q1", "Q2", "Q3", "Q4"];

/// Four-way split over two channels. "Upper" means at or above the threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadOp {
    pub name: String,
    pub xchannel: String,
    pub xthreshold: f64,
    pub ychannel: String,
    pub ythreshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuadrantRow {
    pub quadrant: &'static str,
    pub quadrant_name: String,
    pub cells: usize,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuadrantStats {
    pub total: usize,
    pub rows: Vec<QuadrantRow>,
}

impl QuadOp {
    /// Zero-based quadrant index of one event.
    pub fn quadrant_of(&self, x: f64, y: f64) -> usize {
        let right = x >= self.xthreshold;
        let top = y >= self.ythreshold;
        match (right, top) {
            (false, true) => 0,
            (true, true) => 1,
            (false, false) => 2,
            (true, false) => 3,
        }
    }

    pub fn label(&self, quadrant: usize) -> String {
        format!("{}_{}", self.name, quadrant + 1)
    }

    /// Counts and percentages of an experiment this gate has been applied to.
    /// An experiment without events is rejected instead of producing NaN.
    pub fn statistics(&self, experiment: &Experiment) -> Result<QuadrantStats> {
        let counts = experiment.category(&self.name)?.counts();
        quadrant_statistics(&self.name, &counts)
    }
}

pub fn quadrant_statistics(gate: &str, counts: &[usize]) -> Result<QuadrantStats> {
    if counts.len() != QUADRANTS.len() {
        return Err(PipelineError::params(format!(
            "quadrant gate {} has {} levels, expected 4",
            gate,
            counts.len()
        )));
    }
    let total: usize = counts.iter().sum();
    if total == 0 {
        return Err(PipelineError::EmptyGate {
            gate: gate.to_string(),
        });
    }
    let rows = QUADRANTS
        .iter()
        .zip(counts)
        .enumerate()
        .map(|(i, (&quadrant, &cells))| QuadrantRow {
            quadrant,
            quadrant_name: format!("{}_{}", gate, i + 1),
            cells,
            percent: round2(cells as f64 / total as f64 * 100.0),
        })
        .collect();
    Ok(QuadrantStats { total, rows })
}

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

impl Operation for QuadOp {
    fn name(&self) -> &str {
        &self.name
    }

    fn transform(&self, experiment: &Experiment) -> Result<Experiment> {
        let xs = experiment.channel(&self.xchannel)?;
        let ys = experiment.channel(&self.ychannel)?;
        let codes = xs
            .iter()
            .zip(ys)
            .map(|(&x, &y)| Some(self.quadrant_of(x, y) as u32))
            .collect();
        let levels = (0..QUADRANTS.len()).map(|q| self.label(q)).collect();
        experiment.with_label(LabelColumn::category(
            self.name.clone(),
            Category { levels, codes },
        ))
    }
}

#[cfg(test)]
#[path = "../../tests/src_inline/model/gates.rs"]
mod tests;
