use std::{
    collections::BTreeMap,
    path::{
        Path,
        PathBuf,
    },
};

use crate::{
    dispatch::JobHandle,
    job::SubmissionContext,
};

pub const RENDER_PLUGIN: &str = "MayaBatch";
pub const TRANSCODE_PLUGIN: &str = "DraftPlugin";
pub const PUBLISH_PLUGIN: &str = "Python";

// flat key/value description of one job file; keys are unique and
// serialize in a stable order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobSpec(BTreeMap<String, String>);

impl JobSpec {
    pub fn new() -> Self {
        JobSpec(BTreeMap::new())
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for JobSpec {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        JobSpec(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

// fields every job_info file carries
#[derive(Debug, Clone)]
pub struct BaseFields {
    pub batch_name: String,
    pub name: String,
    pub comment: String,
    pub priority: u32,
    pub chunk_size: u32,
    pub pool: String,
}

impl BaseFields {
    fn from_context(context: &SubmissionContext) -> Self {
        BaseFields {
            batch_name: context.batch_name.clone(),
            name: context.job_name.clone(),
            comment: context.comment.clone(),
            priority: context.priority,
            chunk_size: context.chunk_size,
            pool: context.pool.clone(),
        }
    }

    fn job_info(&self, plugin: &str) -> JobSpec {
        let mut spec = JobSpec::new();
        spec.set("BatchName", self.batch_name.as_str());
        spec.set("Name", self.name.as_str());
        spec.set("Comment", self.comment.as_str());
        spec.set("Priority", self.priority.to_string());
        spec.set("ChunkSize", self.chunk_size.to_string());
        spec.set("Plugin", plugin);
        spec.set("Pool", self.pool.as_str());
        spec
    }
}

#[derive(Debug, Clone)]
pub struct RenderJob {
    pub base: BaseFields,
    pub frames: String,
    pub image_dir: PathBuf,
    pub file_name: String,
    pub camera: String,
    pub renderer: String,
    pub scene_file: PathBuf,
    pub app_version: String,
}

#[derive(Debug, Clone)]
pub struct TranscodeJob {
    pub base: BaseFields,
    pub depends_on: Option<JobHandle>,
    pub script_file: PathBuf,
    pub movie_path: PathBuf,
    pub sequence_path: PathBuf,
    pub start_frame: i64,
    pub end_frame: i64,
}

#[derive(Debug, Clone)]
pub struct PublishJob {
    pub base: BaseFields,
    pub depends_on: Option<JobHandle>,
    // handed to the runner script as its only argument
    pub arguments: String,
    pub python_version: String,
}

// one farm job; each variant carries exactly what its files need
#[derive(Debug, Clone)]
pub enum JobKind {
    Render(RenderJob),

    Transcode(TranscodeJob),

    Publish(PublishJob),
}

impl JobKind {
    pub fn render(context: &SubmissionContext) -> Self {
        JobKind::Render(RenderJob {
            base: BaseFields::from_context(context),
            frames: context.frames(),
            image_dir: context.image_dir(),
            file_name: context.file_name.clone(),
            camera: context.camera.clone(),
            renderer: context.renderer.clone(),
            scene_file: context.scene_file.clone(),
            app_version: context.app_version.clone(),
        })
    }

    pub fn transcode(
        context: &SubmissionContext,
        script_file: &Path,
        depends_on: Option<JobHandle>,
    ) -> Self {
        JobKind::Transcode(TranscodeJob {
            base: BaseFields::from_context(context),
            depends_on,
            script_file: script_file.to_path_buf(),
            movie_path: context.movie_path(),
            sequence_path: context.sequence_path(),
            start_frame: context.start_frame,
            end_frame: context.end_frame,
        })
    }

    pub fn publish(
        context: &SubmissionContext,
        arguments: &str,
        python_version: &str,
        depends_on: Option<JobHandle>,
    ) -> Self {
        JobKind::Publish(PublishJob {
            base: BaseFields::from_context(context),
            depends_on,
            arguments: arguments.to_string(),
            python_version: python_version.to_string(),
        })
    }

    // directory name under the temp root
    pub fn tag(&self) -> &'static str {
        match self {
            JobKind::Render(_) => "render",
            JobKind::Transcode(_) => "transcode",
            JobKind::Publish(_) => "publish",
        }
    }

    pub fn job_info(&self) -> JobSpec {
        match self {
            JobKind::Render(job) => {
                let mut spec = job.base.job_info(RENDER_PLUGIN);
                spec.set("Frames", job.frames.as_str());
                spec.set("OutputDirectory0", job.image_dir.display().to_string());
                spec.set("OutputFilename0", job.file_name.as_str());
                spec
            },

            JobKind::Transcode(TranscodeJob { base, depends_on, .. }) => {
                with_dependency(base.job_info(TRANSCODE_PLUGIN), depends_on)
            },

            JobKind::Publish(PublishJob { base, depends_on, .. }) => {
                with_dependency(base.job_info(PUBLISH_PLUGIN), depends_on)
            },
        }
    }

    pub fn plugin_info(&self) -> JobSpec {
        match self {
            JobKind::Render(job) => JobSpec::from_iter([
                ("OutputFilePath", job.image_dir.display().to_string()),
                ("Camera", job.camera.clone()),
                ("Renderer", job.renderer.clone()),
                ("StrictErrorChecking", String::from("0")),
                ("SceneFile", job.scene_file.display().to_string()),
                ("Version", job.app_version.clone()),
                (
                    "OutputFilePrefix",
                    job.image_dir.join(&job.file_name).display().to_string(),
                ),
            ]),

            // the convert script parses `name=value` script args
            JobKind::Transcode(job) => JobSpec::from_iter([
                ("scriptFile", job.script_file.display().to_string()),
                ("ScriptArg0", format!("mov={}", job.movie_path.display())),
                ("ScriptArg1", format!("exr={}", job.sequence_path.display())),
                ("ScriptArg2", format!("start_frame={}", job.start_frame)),
                ("ScriptArg3", format!("end_frame={}", job.end_frame)),
            ]),

            JobKind::Publish(job) => JobSpec::from_iter([
                ("Arguments", job.arguments.clone()),
                ("SingleFramesOnly", String::from("False")),
                ("Version", job.python_version.clone()),
            ]),
        }
    }
}

fn with_dependency(mut spec: JobSpec, depends_on: &Option<JobHandle>) -> JobSpec {
    if let Some(handle) = depends_on {
        spec.set("JobDependency0", handle.as_str());
    }
    spec
}
