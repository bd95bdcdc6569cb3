use std::path::PathBuf;

use plotters::drawing::DrawingAreaErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("data import failed for {}: {message}", path.display())]
    DataImport { path: PathBuf, message: String },

    #[error("channel not found: {channel} (available: {})", available.join(", "))]
    ChannelNotFound {
        channel: String,
        available: Vec<String>,
    },

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("estimation failed: {0}")]
    Estimation(String),

    #[error("gate {gate} has no events; percentages are undefined")]
    EmptyGate { gate: String },

    #[error("plot error: {0}")]
    Plot(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    pub fn import(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::DataImport {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn params(message: impl Into<String>) -> Self {
        Self::InvalidParams(message.into())
    }

    pub fn estimation(message: impl Into<String>) -> Self {
        Self::Estimation(message.into())
    }
}

impl<E: std::error::Error + Send + Sync> From<DrawingAreaErrorKind<E>> for PipelineError {
    fn from(value: DrawingAreaErrorKind<E>) -> Self {
        PipelineError::Plot(value.to_string())
    }
}
