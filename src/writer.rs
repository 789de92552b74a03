use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};
use log::debug;

use crate::{
    error::FileSystemError,
    job_spec::{
        JobKind,
        JobSpec,
    },
};

// the pair of files the scheduler command takes for one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDescriptionFiles {
    pub job_info: PathBuf,

    pub plugin_info: PathBuf,
}

impl JobDescriptionFiles {
    // in the order the scheduler command expects them
    pub fn to_vec(&self) -> Vec<PathBuf> {
        vec![self.job_info.clone(), self.plugin_info.clone()]
    }
}

#[derive(Debug, Clone)]
pub struct JobDescriptionWriter {
    temp_root: PathBuf,
}

impl JobDescriptionWriter {
    pub fn new(temp_root: impl Into<PathBuf>) -> Self {
        JobDescriptionWriter {
            temp_root: temp_root.into(),
        }
    }

    pub fn temp_root(&self) -> &Path {
        &self.temp_root
    }

    // <temp root>/<job type>/deadline_job_files
    pub fn job_dir(&self, tag: &str) -> PathBuf {
        self.temp_root
            .join(tag)
            .join("deadline_job_files")
    }

    // where `write` puts the files, without touching the disk
    pub fn file_paths(
        &self,
        tag: &str,
        file_name: &str,
        camera: &str,
    ) -> JobDescriptionFiles {
        let dir = self.job_dir(tag);
        let suffix = format!("{file_name}_{}.job", sanitize_camera(camera));
        JobDescriptionFiles {
            job_info: dir.join(format!("job_info_{suffix}")),
            plugin_info: dir.join(format!("plugin_info_{suffix}")),
        }
    }

    pub fn write(
        &self,
        job: &JobKind,
        file_name: &str,
        camera: &str,
    ) -> Result<JobDescriptionFiles, FileSystemError> {
        create_dir(&self.job_dir(job.tag()))?;
        let files = self.file_paths(job.tag(), file_name, camera);
        write_file(&files.job_info, &serialize(&job.job_info()))?;
        write_file(&files.plugin_info, &serialize(&job.plugin_info()))?;
        debug!(
            "Wrote `{}` job files to `{}`.",
            job.tag(),
            self.job_dir(job.tag()).display()
        );
        Ok(files)
    }
}

// dag paths like `|grp|cam` would otherwise leak into the file name
pub fn sanitize_camera(camera: &str) -> String {
    camera.replace(['|', '/', '\\', ':'], "_")
}

// a name used as exactly one directory level under the temp root
pub fn sanitize_component(name: &str) -> String {
    let name = sanitize_camera(name);
    match name.as_str() {
        "" | "." | ".." => "_".repeat(name.len().max(1)),

        _ => name,
    }
}

// one `key=value` per line, no escaping
pub fn serialize(spec: &JobSpec) -> String {
    spec.iter()
        .map(|(key, value)| format!("{key}={value}\n"))
        .collect()
}

// idempotent, existing directories are fine
pub fn create_dir(path: &Path) -> Result<(), FileSystemError> {
    fs::create_dir_all(path)
        .map_err(|source| FileSystemError::CreateDir {
            path: path.to_path_buf(),
            source,
        })
}

// create or overwrite
pub fn write_file(path: &Path, contents: &str) -> Result<(), FileSystemError> {
    fs::write(path, contents)
        .map_err(|source| FileSystemError::Write {
            path: path.to_path_buf(),
            source,
        })
}
