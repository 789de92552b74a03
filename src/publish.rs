use std::path::{
    Path,
    PathBuf,
};
use serde::Serialize;
use log::debug;

use crate::{
    config::{
        ReviewSiteSettings,
        Settings,
    },
    error::FileSystemError,
    job::{
        EntityRef,
        ReviewContext,
        SubmissionContext,
    },
    writer::{
        create_dir,
        sanitize_component,
        write_file,
    },
};

// bump together with PAYLOAD_FORMAT in assets/publish_version.py
pub const PAYLOAD_FORMAT: u32 = 1;

const PUBLISH_RUNNER: &str = include_str!("../assets/publish_version.py");
const CONVERT_SCRIPT: &str = include_str!("../assets/draft_convert.py");

#[derive(Debug, Serialize)]
pub struct SiteConnection<'a> {
    pub url: &'a str,

    pub script_name: &'a str,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<&'a str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_proxy: Option<&'a str>,
}

// fields of the Version record, named as the review site names them
#[derive(Debug, Serialize)]
pub struct VersionFields<'a> {
    pub project: &'a EntityRef,
    pub code: &'a str,
    pub description: &'a str,
    pub sg_path_to_frames: String,
    pub sg_path_to_movie: String,
    pub sg_status_list: &'static str,
    pub entity: &'a EntityRef,
    pub sg_task: &'a EntityRef,
    pub user: &'a EntityRef,
}

// everything the farm-side runner needs, as data rather than code
#[derive(Debug, Serialize)]
pub struct PublishPayload<'a> {
    pub format: u32,

    pub site: SiteConnection<'a>,

    pub version: VersionFields<'a>,

    pub movie_path: String,
}

impl<'a> PublishPayload<'a> {
    pub fn new(
        context: &'a SubmissionContext,
        review: &'a ReviewContext,
        site: &'a ReviewSiteSettings,
    ) -> Self {
        let movie_path = context.movie_path().display().to_string();
        PublishPayload {
            format: PAYLOAD_FORMAT,
            site: SiteConnection {
                url: &site.site_url,
                script_name: &site.script_name,
                api_key: site.api_key.as_deref(),
                http_proxy: site.http_proxy.as_deref(),
            },
            version: VersionFields {
                project: &review.project,
                code: &context.file_name,
                description: &context.comment,
                sg_path_to_frames: context.sequence_path().display().to_string(),
                sg_path_to_movie: movie_path.clone(),
                sg_status_list: "rev",
                entity: &review.shot,
                sg_task: &review.task,
                user: &review.user,
            },
            movie_path,
        }
    }
}

// the runner script and its payload, shipped to the farm as auxiliary files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishArtifacts {
    pub script: PathBuf,

    pub payload: PathBuf,
}

impl PublishArtifacts {
    // the Python plugin runs the first auxiliary file
    pub fn to_vec(&self) -> Vec<PathBuf> {
        vec![self.script.clone(), self.payload.clone()]
    }

    // what the runner gets as its argument; auxiliary files land side by side
    pub fn payload_name(&self) -> String {
        self.payload
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

// <temp root>/playblast/<project>/<sequence>/<shot>, one level per name
pub fn publish_dir(temp_root: &Path, review: &ReviewContext) -> PathBuf {
    temp_root
        .join("playblast")
        .join(sanitize_component(&review.project.name))
        .join(sanitize_component(&review.sequence))
        .join(sanitize_component(&review.shot.name))
}

pub fn write_publish_artifacts(
    temp_root: &Path,
    context: &SubmissionContext,
    review: &ReviewContext,
    site: &ReviewSiteSettings,
) -> Result<PublishArtifacts, FileSystemError> {
    let dir = publish_dir(temp_root, review);
    create_dir(&dir)?;
    let artifacts = PublishArtifacts {
        script: dir.join(format!("{}.py", context.file_name)),
        payload: dir.join(format!("{}.json", context.file_name)),
    };
    let payload = PublishPayload::new(context, review, site);
    write_file(&artifacts.payload, &serde_json::to_string_pretty(&payload)?)?;
    write_file(&artifacts.script, PUBLISH_RUNNER)?;
    debug!("Wrote publish script to `{}`.", artifacts.script.display());
    Ok(artifacts)
}

// a site script wins over the bundled one, which is written on demand
pub fn convert_script(temp_root: &Path, settings: &Settings) -> Result<PathBuf, FileSystemError> {
    if let Some(script) = &settings.transcode.script_file {
        return Ok(script.clone());
    }
    let dir = temp_root.join("transcode");
    create_dir(&dir)?;
    let script = dir.join("draft_convert.py");
    write_file(&script, CONVERT_SCRIPT)?;
    Ok(script)
}
