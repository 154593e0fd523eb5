use std::path::PathBuf;

use anyhow::Error;

/// Exit code when the output folder already exists and `--force` was not given.
pub const EXIT_OUTPUT_EXISTS: i32 = 1;
/// Exit code when the generator returned non-zero for one of the steps.
pub const EXIT_JOB_FAILED: i32 = 2;
/// Exit code for every other failure.
pub const EXIT_OTHER: i32 = 1;

pub type DreamResult<T> = Result<T, DreamError>;

#[derive(thiserror::Error, Debug)]
pub enum DreamError {
    #[error("invalid command format: {reason} (line: '{line}')")]
    InvalidCommandFormat { line: String, reason: String },

    #[error("config field '{field}': {reason}")]
    ConfigField { field: String, reason: String },

    #[error("generation job {index} failed with exit code {exit_code}: {invocation}")]
    GenerationJobFailed {
        index: usize,
        exit_code: i32,
        invocation: String,
    },

    #[error("malformed artifact name: {}", path.display())]
    MalformedArtifactName { path: PathBuf },

    #[error("merge error: {0}")]
    Merge(String),

    #[error("output folder already exists: {} (use --force to reuse it)", path.display())]
    OutputFolderExists { path: PathBuf },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DreamError {
    pub fn invalid_command(line: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidCommandFormat {
            line: line.into(),
            reason: reason.into(),
        }
    }

    pub fn config_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn merge(msg: impl Into<String>) -> Self {
        Self::Merge(msg.into())
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::OutputFolderExists { .. } => EXIT_OUTPUT_EXISTS,
            Self::GenerationJobFailed { .. } => EXIT_JOB_FAILED,
            Self::Other(inner) => exit_code_for(inner),
            Self::InvalidCommandFormat { .. }
            | Self::ConfigField { .. }
            | Self::MalformedArtifactName { .. }
            | Self::Merge(_) => EXIT_OTHER,
        }
    }
}

pub fn find_dream_error(error: &Error) -> Option<&DreamError> {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<DreamError>())
}

pub fn exit_code_for(error: &Error) -> i32 {
    find_dream_error(error)
        .map(DreamError::exit_code)
        .unwrap_or(EXIT_OTHER)
}
