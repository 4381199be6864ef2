use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("line {line}, column `{column}`: {message}")]
    DataFormat {
        line: u64,
        column: String,
        message: String,
    },

    #[error("required column `{0}` is missing from the header row")]
    MissingColumn(String),

    #[error("unknown measure `{0}`")]
    UnknownMeasure(String),

    #[error("unknown group key `{0}`")]
    UnknownGroupKey(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn data_format(line: u64, column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DataFormat {
            line,
            column: column.into(),
            message: message.into(),
        }
    }
}
