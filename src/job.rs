use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};
use serde::{
    Serialize,
    Deserialize,
};
use log::info;

use crate::{
    config::Settings,
    error::ConfigurationError,
};

// frame placeholder understood by the convert script and the review site
pub const FRAME_PLACEHOLDER: &str = "####";

#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    // defaults to the job name
    pub batch_name: Option<String>,

    pub name: String,

    #[serde(default)]
    pub comment: String,

    #[serde(default)]
    pub pool: String,

    #[serde(default = "default_priority")]
    pub priority: u32,

    // frames per task
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u32,

    #[serde(default = "default_steps")]
    pub steps: u32,

    // full dag path of the render camera, e.g. `|hud_grp|shotCam`
    pub camera: String,

    pub start_frame: i64,

    pub end_frame: i64,

    pub scene_file: PathBuf,

    pub output_folder: PathBuf,

    pub file_name: String,

    #[serde(default = "default_renderer")]
    pub renderer: String,

    #[serde(default = "default_app_version")]
    pub app_version: String,
}

fn default_priority() -> u32 { 50 }

fn default_chunk_size() -> u32 { 10 }

fn default_steps() -> u32 { 1 }

fn default_renderer() -> String { String::from("mayaHardware2") }

fn default_app_version() -> String { String::from("2020") }

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StagesConfig {
    pub render_on_farm: bool,

    pub publish_movie: bool,
}

// a link to a record on the review-tracking site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRef {
    #[serde(rename = "type")]
    pub kind: String,

    pub id: u64,

    pub name: String,
}

// where a published movie lands on the review-tracking site
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReviewContext {
    pub project: EntityRef,

    pub sequence: String,

    pub shot: EntityRef,

    pub task: EntityRef,

    pub user: EntityRef,
}

// job file as read in from disk
#[derive(Debug, Deserialize)]
pub struct Schema {
    pub job: JobConfig,

    #[serde(default)]
    pub stages: StagesConfig,

    pub review: Option<ReviewContext>,
}

// everything one submission run needs, read-only for the whole run
#[derive(Debug, Clone)]
pub struct SubmissionContext {
    pub batch_name: String,
    pub job_name: String,
    pub comment: String,
    pub pool: String,
    pub priority: u32,
    pub chunk_size: u32,
    pub steps: u32,
    pub camera: String,
    pub start_frame: i64,
    pub end_frame: i64,
    pub scene_file: PathBuf,
    pub output_folder: PathBuf,
    pub file_name: String,
    pub renderer: String,
    pub app_version: String,

    pub render_on_farm: bool,
    pub publish_movie: bool,

    pub review: Option<ReviewContext>,
}

impl From<Schema> for SubmissionContext {
    fn from(schema: Schema) -> Self {
        let job = schema.job;
        SubmissionContext {
            batch_name: job.batch_name.unwrap_or_else(|| job.name.clone()),
            job_name: job.name,
            comment: job.comment,
            pool: job.pool,
            priority: job.priority,
            chunk_size: job.chunk_size,
            steps: job.steps,
            camera: job.camera,
            start_frame: job.start_frame,
            end_frame: job.end_frame,
            scene_file: job.scene_file,
            output_folder: job.output_folder,
            file_name: job.file_name,
            renderer: job.renderer,
            app_version: job.app_version,
            render_on_farm: schema.stages.render_on_farm,
            publish_movie: schema.stages.publish_movie,
            review: schema.review,
        }
    }
}

impl SubmissionContext {
    // `<start>-<end>every<step>`
    pub fn frames(&self) -> String {
        format!("{}-{}every{}", self.start_frame, self.end_frame, self.steps)
    }

    // <output folder>/<file name>, where the render writes its frames
    pub fn image_dir(&self) -> PathBuf {
        self.output_folder.join(&self.file_name)
    }

    pub fn sequence_path(&self) -> PathBuf {
        self.image_dir()
            .join(format!("{}.{FRAME_PLACEHOLDER}.exr", self.file_name))
    }

    pub fn movie_path(&self) -> PathBuf {
        self.image_dir()
            .join(format!("{}.mov", self.file_name))
    }

    // collects every problem so the artist can fix them in one go
    pub fn validate(&self, settings: &Settings) -> Result<(), ConfigurationError> {
        let mut problems = Vec::new();
        let required = [
            ("job name", self.job_name.as_str()),
            ("file name", self.file_name.as_str()),
            ("camera", self.camera.as_str()),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                problems.push(format!("`{field}` must not be empty"));
            }
        }
        if self.output_folder.as_os_str().is_empty() {
            problems.push(String::from("`output folder` must not be empty"));
        }
        if self.scene_file.as_os_str().is_empty() {
            problems.push(String::from("`scene file` must not be empty, save the scene first"));
        }
        if self.start_frame > self.end_frame {
            problems.push(format!(
                "start frame `{}` is after end frame `{}`",
                self.start_frame,
                self.end_frame
            ));
        }
        if self.steps == 0 {
            problems.push(String::from("`steps` must be at least 1"));
        }
        if self.chunk_size == 0 {
            problems.push(String::from("`chunk size` must be at least 1"));
        }
        if self.priority > 100 {
            problems.push(format!("priority `{}` is outside 0..=100", self.priority));
        }
        let pools = &settings.farm.pools;
        if false == pools.is_empty() && false == pools.contains(&self.pool) {
            problems.push(format!(
                "pool `{}` is not one of: {}",
                self.pool,
                pools.join(", ")
            ));
        }
        if self.publish_movie && self.review.is_none() {
            problems.push(String::from("publishing the movie needs a `[review]` section"));
        }
        if let Some(review) = self.review.as_ref().filter(|_| self.publish_movie) {
            let names = [
                ("project", review.project.name.as_str()),
                ("sequence", review.sequence.as_str()),
                ("shot", review.shot.name.as_str()),
            ];
            for (field, name) in names {
                if matches!(name.trim(), "" | "." | "..") {
                    problems.push(format!("review {field} name `{name}` can't be a directory name"));
                }
            }
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigurationError::Invalid(problems))
        }
    }
}

// read a job file from disk
pub fn load_job(job_file: &Path) -> Result<SubmissionContext, ConfigurationError> {
    let raw = fs::read_to_string(job_file)
        .map_err(|source| ConfigurationError::Read {
            kind: "job",
            path: job_file.to_path_buf(),
            source,
        })?;
    let schema: Schema = toml::from_str(&raw)
        .map_err(|source| ConfigurationError::Parse {
            kind: "job",
            path: job_file.to_path_buf(),
            source,
        })?;
    let context = SubmissionContext::from(schema);
    info!(
        "Loaded job `{}`, frames `{}`, camera `{}`.",
        context.job_name,
        context.frames(),
        context.camera
    );
    Ok(context)
}
