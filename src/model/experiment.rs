use std::fmt;
use std::sync::Arc;

use crate::error::{PipelineError, Result};

/// A categorical column: `codes[e]` indexes into `levels`, `None` means unassigned.
#[derive(Debug, Clone, PartialEq)]
pub struct Category {
    pub levels: Vec<String>,
    pub codes: Vec<Option<u32>>,
}

impl Category {
    pub fn value(&self, event: usize) -> Option<&str> {
        self.codes
            .get(event)
            .copied()
            .flatten()
            .and_then(|c| self.levels.get(c as usize))
            .map(String::as_str)
    }

    /// Event count per level, in level order.
    pub fn counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.levels.len()];
        for code in self.codes.iter().flatten() {
            counts[*code as usize] += 1;
        }
        counts
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LabelValues {
    Bool(Vec<bool>),
    Category(Category),
}

impl LabelValues {
    pub fn len(&self) -> usize {
        match self {
            LabelValues::Bool(v) => v.len(),
            LabelValues::Category(c) => c.codes.len(),
        }
    }

    /// Text form used by the exported cell matrix.
    pub fn render(&self, event: usize) -> &str {
        match self {
            LabelValues::Bool(v) => {
                if v[event] {
                    "True"
                } else {
                    "False"
                }
            }
            LabelValues::Category(c) => c.value(event).unwrap_or(""),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelColumn {
    pub name: String,
    pub values: Arc<LabelValues>,
}

impl LabelColumn {
    pub fn flags(name: impl Into<String>, values: Vec<bool>) -> Self {
        Self {
            name: name.into(),
            values: Arc::new(LabelValues::Bool(values)),
        }
    }

    pub fn category(name: impl Into<String>, category: Category) -> Self {
        Self {
            name: name.into(),
            values: Arc::new(LabelValues::Category(category)),
        }
    }
}

/// Which events an estimate phase is allowed to look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subset {
    All,
    /// Events whose boolean label column is `true`.
    Flag(String),
}

impl fmt::Display for Subset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subset::All => write!(f, "all events"),
            Subset::Flag(name) => write!(f, "{} == True", name),
        }
    }
}

/// A deterministic transformation of an experiment. Estimation happens when
/// the operation is constructed; `transform` only applies the parameters.
pub trait Operation: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;
    fn transform(&self, experiment: &Experiment) -> Result<Experiment>;
}

/// Immutable snapshot of all events of one experiment. Stages never mutate a
/// snapshot; they derive a new one that shares untouched columns.
#[derive(Debug, Clone)]
pub struct Experiment {
    channels: Vec<String>,
    data: Vec<Arc<Vec<f64>>>,
    condition_name: String,
    conditions: Arc<Category>,
    labels: Vec<LabelColumn>,
    tube_sizes: Vec<usize>,
    history: Vec<Arc<dyn Operation>>,
}

impl Experiment {
    pub fn new(
        channels: Vec<String>,
        data: Vec<Vec<f64>>,
        condition_name: String,
        conditions: Category,
        tube_sizes: Vec<usize>,
    ) -> Result<Self> {
        if channels.len() != data.len() {
            return Err(PipelineError::params(format!(
                "{} channel names for {} data columns",
                channels.len(),
                data.len()
            )));
        }
        let n_events = conditions.codes.len();
        if let Some((name, col)) = channels
            .iter()
            .zip(data.iter())
            .find(|(_, col)| col.len() != n_events)
        {
            return Err(PipelineError::params(format!(
                "channel {} has {} events, expected {}",
                name,
                col.len(),
                n_events
            )));
        }
        if tube_sizes.iter().sum::<usize>() != n_events {
            return Err(PipelineError::params(
                "tube sizes do not add up to the event count",
            ));
        }
        Ok(Self {
            channels,
            data: data.into_iter().map(Arc::new).collect(),
            condition_name,
            conditions: Arc::new(conditions),
            labels: Vec::new(),
            tube_sizes,
            history: Vec::new(),
        })
    }

    pub fn n_events(&self) -> usize {
        self.conditions.codes.len()
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.channels.iter().any(|c| c == name)
    }

    pub fn channel_index(&self, name: &str) -> Result<usize> {
        self.channels
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| PipelineError::ChannelNotFound {
                channel: name.to_string(),
                available: self.channels.clone(),
            })
    }

    pub fn channel(&self, name: &str) -> Result<&[f64]> {
        let idx = self.channel_index(name)?;
        Ok(self.data[idx].as_slice())
    }

    pub fn condition_name(&self) -> &str {
        &self.condition_name
    }

    pub fn conditions(&self) -> &Category {
        &self.conditions
    }

    pub fn tube_sizes(&self) -> &[usize] {
        &self.tube_sizes
    }

    pub fn labels(&self) -> &[LabelColumn] {
        &self.labels
    }

    pub fn label(&self, name: &str) -> Option<&LabelColumn> {
        self.labels.iter().find(|l| l.name == name)
    }

    pub fn flag(&self, name: &str) -> Result<&[bool]> {
        match self.label(name).map(|l| l.values.as_ref()) {
            Some(LabelValues::Bool(v)) => Ok(v.as_slice()),
            Some(LabelValues::Category(_)) => Err(PipelineError::params(format!(
                "column {} is categorical, not boolean",
                name
            ))),
            None => Err(PipelineError::params(format!("no label column named {}", name))),
        }
    }

    pub fn category(&self, name: &str) -> Result<&Category> {
        match self.label(name).map(|l| l.values.as_ref()) {
            Some(LabelValues::Category(c)) => Ok(c),
            Some(LabelValues::Bool(_)) => Err(PipelineError::params(format!(
                "column {} is boolean, not categorical",
                name
            ))),
            None => Err(PipelineError::params(format!("no label column named {}", name))),
        }
    }

    pub fn history(&self) -> &[Arc<dyn Operation>] {
        &self.history
    }

    /// Event indices selected by `subset`, in event order.
    pub fn subset_indices(&self, subset: &Subset) -> Result<Vec<usize>> {
        match subset {
            Subset::All => Ok((0..self.n_events()).collect()),
            Subset::Flag(name) => Ok(self
                .flag(name)?
                .iter()
                .enumerate()
                .filter_map(|(i, &keep)| keep.then_some(i))
                .collect()),
        }
    }

    /// New snapshot with `column` added, or replacing a label of the same name in place.
    pub fn with_label(&self, column: LabelColumn) -> Result<Experiment> {
        if column.values.len() != self.n_events() {
            return Err(PipelineError::params(format!(
                "label {} has {} values, expected {}",
                column.name,
                column.values.len(),
                self.n_events()
            )));
        }
        if self.has_channel(&column.name) || column.name == self.condition_name {
            return Err(PipelineError::params(format!(
                "label {} collides with a channel or condition column",
                column.name
            )));
        }
        let mut next = self.clone();
        match next.labels.iter_mut().find(|l| l.name == column.name) {
            Some(existing) => *existing = column,
            None => next.labels.push(column),
        }
        Ok(next)
    }

    /// New snapshot with the values of one channel replaced.
    pub fn with_channel(&self, name: &str, values: Vec<f64>) -> Result<Experiment> {
        let idx = self.channel_index(name)?;
        if values.len() != self.n_events() {
            return Err(PipelineError::params(format!(
                "channel {} replacement has {} values, expected {}",
                name,
                values.len(),
                self.n_events()
            )));
        }
        let mut next = self.clone();
        next.data[idx] = Arc::new(values);
        Ok(next)
    }

    /// Runs `op` and records it in the history of the result.
    pub fn apply(&self, op: Arc<dyn Operation>) -> Result<Experiment> {
        let mut next = op.transform(self)?;
        next.history.push(op);
        Ok(next)
    }

    /// Applies this experiment's history, in order, to another experiment
    /// (typically a freshly imported control tube).
    pub fn replay(&self, target: Experiment) -> Result<Experiment> {
        let mut current = target;
        for op in &self.history {
            tracing::debug!(operation = op.name(), "replaying operation onto control");
            current = current.apply(Arc::clone(op))?;
        }
        Ok(current)
    }
}

#[cfg(test)]
#[path = "../../tests/src_inline/model/experiment.rs"]
mod tests;
