use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use crate::error::Result;
use crate::model::experiment::Experiment;
use crate::model::gates::QuadrantStats;
use crate::report::format_value;

/// Full per-event dump: channels in import order, the condition column, then
/// every label column in the order it was added. Rows are never filtered.
pub fn write_cell_matrix(experiment: &Experiment, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut w = csv::Writer::from_writer(BufWriter::new(File::create(path)?));

    let mut header: Vec<&str> = experiment.channels().iter().map(String::as_str).collect();
    header.push(experiment.condition_name());
    header.extend(experiment.labels().iter().map(|l| l.name.as_str()));
    w.write_record(&header)?;

    let columns = experiment
        .channels()
        .iter()
        .map(|c| experiment.channel(c))
        .collect::<Result<Vec<_>>>()?;
    let conditions = experiment.conditions();
    let labels = experiment.labels();

    let mut row: Vec<String> = Vec::with_capacity(header.len());
    for event in 0..experiment.n_events() {
        row.clear();
        row.extend(columns.iter().map(|col| format_value(col[event])));
        row.push(conditions.value(event).unwrap_or_default().to_string());
        row.extend(labels.iter().map(|l| l.values.render(event).to_string()));
        w.write_record(&row)?;
    }
    w.flush()?;
    tracing::info!(
        path = %path.display(),
        rows = experiment.n_events(),
        columns = header.len(),
        "wrote cell matrix"
    );
    Ok(())
}

pub fn write_quadrant_statistics(stats: &QuadrantStats, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut w = csv::Writer::from_writer(BufWriter::new(File::create(path)?));
    w.write_record(["quadrant", "quadrant_name", "cells"])?;
    for row in &stats.rows {
        let cells = row.cells.to_string();
        w.write_record([row.quadrant, row.quadrant_name.as_str(), cells.as_str()])?;
    }
    w.flush()?;
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/src_inline/report/tables.rs"]
mod tests;
