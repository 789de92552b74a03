//! Farm submission for shot previews.
//!
//! Writes Deadline job files for a render, a transcode and a review publish,
//! submits them through `deadlinecommand` with each job waiting on the one
//! before it, and reports the job ids the farm handed back.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod job;
pub mod job_spec;
pub mod pipeline;
pub mod publish;
pub mod writer;

pub use config::{
    Environment,
    Settings,
};
pub use dispatch::{
    Dispatch,
    DryRunDispatcher,
    FarmDispatcher,
    JobHandle,
};
pub use error::{
    ConfigurationError,
    DispatchError,
    FileSystemError,
    StageError,
    SubmitError,
};
pub use job::{
    load_job,
    SubmissionContext,
};
pub use pipeline::{
    Pipeline,
    Stage,
    SubmissionReport,
};
pub use writer::JobDescriptionWriter;
