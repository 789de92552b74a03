use std::{
    fmt,
    path::PathBuf,
};
use log::{
    info,
    warn,
};

use crate::{
    config::Settings,
    dispatch::{
        Dispatch,
        JobHandle,
    },
    error::{
        ConfigurationError,
        StageError,
        SubmitError,
    },
    job::SubmissionContext,
    job_spec::JobKind,
    publish::{
        convert_script,
        write_publish_artifacts,
    },
    writer::JobDescriptionWriter,
};

/*
a submission runs up to three farm jobs, each waiting on the one before:
  0. render     frames are rendered on the farm(only if asked to)
  1. transcode  the exr sequence is encoded into a movie(always)
  2. publish    the movie is uploaded to the review site(only if asked to)
a failed stage stops the run; jobs already on the farm stay there and the
ones depending on them simply never start
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Render,

    Transcode,

    Publish,
}

impl Stage {
    pub fn title(&self) -> &'static str {
        match self {
            Stage::Render => "Render",
            Stage::Transcode => "Transcode",
            Stage::Publish => "Publish",
        }
    }

    // stages a context asks for, in submission order
    pub fn planned(context: &SubmissionContext) -> Vec<Stage> {
        let mut stages = Vec::with_capacity(3);
        if context.render_on_farm {
            stages.push(Stage::Render);
        }
        stages.push(Stage::Transcode);
        if context.publish_movie {
            stages.push(Stage::Publish);
        }
        stages
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Stage::Render => "render",
            Stage::Transcode => "transcode",
            Stage::Publish => "publish",
        };
        f.write_str(tag)
    }
}

// jobs accepted by the farm so far, in order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionReport {
    jobs: Vec<(Stage, JobHandle)>,
}

impl SubmissionReport {
    pub fn record(&mut self, stage: Stage, handle: &JobHandle) {
        self.jobs.push((stage, handle.clone()));
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn handle(&self, stage: Stage) -> Option<&JobHandle> {
        self.jobs
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, handle)| handle)
    }

    // `<Stage> Job Id=<id>` per accepted job
    pub fn lines(&self) -> Vec<String> {
        self.jobs
            .iter()
            .map(|(stage, handle)| format!("{} Job Id={handle}", stage.title()))
            .collect()
    }
}

impl fmt::Display for SubmissionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lines().join("\n"))
    }
}

pub struct Pipeline<D> {
    writer: JobDescriptionWriter,

    dispatcher: D,

    settings: Settings,
}

impl<D: Dispatch> Pipeline<D> {
    pub fn new(writer: JobDescriptionWriter, dispatcher: D, settings: Settings) -> Self {
        Pipeline {
            writer,
            dispatcher,
            settings,
        }
    }

    pub fn writer(&self) -> &JobDescriptionWriter {
        &self.writer
    }

    pub fn submit(&self, context: &SubmissionContext) -> Result<SubmissionReport, SubmitError> {
        let mut report = SubmissionReport::default();
        if let Err(e) = context.validate(&self.settings) {
            warn!("Rejected `{}`: `{e}`", context.job_name);
            return Err(SubmitError {
                stage: None,
                completed: report,
                source: e.into(),
            });
        }

        let render_id = if context.render_on_farm {
            let handle = self
                .render(context)
                .map_err(|source| failed(Stage::Render, &report, source))?;
            report.record(Stage::Render, &handle);
            Some(handle)
        } else {
            None
        };

        let transcode_id = self
            .transcode(context, render_id)
            .map_err(|source| failed(Stage::Transcode, &report, source))?;
        report.record(Stage::Transcode, &transcode_id);

        if context.publish_movie {
            let handle = self
                .publish(context, transcode_id)
                .map_err(|source| failed(Stage::Publish, &report, source))?;
            report.record(Stage::Publish, &handle);
        }

        info!("Submission of `{}` is complete.", context.job_name);
        Ok(report)
    }

    fn render(&self, context: &SubmissionContext) -> Result<JobHandle, StageError> {
        let job = JobKind::render(context);
        self.write_and_dispatch(context, &job, &[], Stage::Render)
    }

    fn transcode(
        &self,
        context: &SubmissionContext,
        depends_on: Option<JobHandle>,
    ) -> Result<JobHandle, StageError> {
        let script = convert_script(self.writer.temp_root(), &self.settings)?;
        let job = JobKind::transcode(context, &script, depends_on);
        self.write_and_dispatch(context, &job, &[], Stage::Transcode)
    }

    fn publish(
        &self,
        context: &SubmissionContext,
        depends_on: JobHandle,
    ) -> Result<JobHandle, StageError> {
        let review = context.review.as_ref().ok_or_else(|| {
            ConfigurationError::Invalid(vec![String::from(
                "publishing the movie needs a `[review]` section",
            )])
        })?;
        let artifacts = write_publish_artifacts(
            self.writer.temp_root(),
            context,
            review,
            &self.settings.review,
        )?;
        let job = JobKind::publish(
            context,
            &artifacts.payload_name(),
            &self.settings.publish.python_version,
            Some(depends_on),
        );
        self.write_and_dispatch(context, &job, &artifacts.to_vec(), Stage::Publish)
    }

    // the files written here are the only ones handed to this dispatch
    fn write_and_dispatch(
        &self,
        context: &SubmissionContext,
        job: &JobKind,
        auxiliary_files: &[PathBuf],
        stage: Stage,
    ) -> Result<JobHandle, StageError> {
        let files = self
            .writer
            .write(job, &context.file_name, &context.camera)?;
        let handle = self
            .dispatcher
            .dispatch(&files.to_vec(), auxiliary_files)?;
        info!("{} Job Id={handle}", stage.title());
        Ok(handle)
    }
}

fn failed(stage: Stage, report: &SubmissionReport, source: StageError) -> SubmitError {
    warn!("The {stage} stage failed: `{source}`");
    SubmitError {
        stage: Some(stage),
        completed: report.clone(),
        source,
    }
}
