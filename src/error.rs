use std::{
    fmt,
    path::PathBuf,
    process::ExitStatus,
    time::Duration,
};
use thiserror::Error;

use crate::pipeline::{
    Stage,
    SubmissionReport,
};

// something the submission needs up front is missing or invalid
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("`{0}` environment variable does not exist.")]
    MissingEnv(&'static str),

    #[error("failed to read {kind} file `{path}`")]
    Read {
        kind: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {kind} file `{path}`")]
    Parse {
        kind: &'static str,
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("home dir is not available")]
    NoHomeDir,

    #[error("invalid submission:\n{}", .0.join("\n"))]
    Invalid(Vec<String>),
}

#[derive(Debug, Error)]
pub enum FileSystemError {
    #[error("failed to create directory `{path}`")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write `{path}`")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode publish payload")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to start the scheduler command `{program}`")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("scheduler command exited with {status}:\n{output}")]
    Failed {
        status: ExitStatus,
        output: String,
    },

    #[error("no job id in the scheduler output:\n{output}")]
    MissingJobId {
        output: String,
    },

    #[error("scheduler command did not finish within {after:?}")]
    Timeout {
        after: Duration,
    },

    #[error("failed to talk to the scheduler command")]
    Io(#[from] std::io::Error),
}

// the reason a single stage went wrong
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    FileSystem(#[from] FileSystemError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

// a submission run that stopped part way; `completed` holds the jobs that
// are already on the farm. `stage` is `None` when the context was rejected
// before any stage ran
#[derive(Debug)]
pub struct SubmitError {
    pub stage: Option<Stage>,

    pub completed: SubmissionReport,

    pub source: StageError,
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stage {
            Some(stage) => write!(f, "{stage} stage failed")?,

            None => f.write_str("submission was rejected")?,
        }
        if self.completed.is_empty() {
            f.write_str(", nothing was submitted")
        } else {
            write!(f, ", already submitted:\n{}", self.completed)
        }
    }
}

impl std::error::Error for SubmitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}
