use std::{
    env,
    fmt,
    path::{
        Path,
        PathBuf,
    },
    process::{
        Output,
        Stdio,
    },
    time::Duration,
};
use tokio::{
    process::Command,
    runtime,
    time::timeout,
};
use log::{
    debug,
    info,
    warn,
};
use uuid::Uuid;

use crate::{
    config::{
        Environment,
        Settings,
        DEADLINE_PATH_VAR,
    },
    error::{
        ConfigurationError,
        DispatchError,
    },
};

// what the scheduler prints in front of the id of an accepted job
pub const JOB_ID_MARKER: &str = "JobID";

// opaque id of an accepted farm job; only good for dependencies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        JobHandle(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// hands job files to the farm, at most once per call
pub trait Dispatch {
    fn dispatch(
        &self,
        description_files: &[PathBuf],
        auxiliary_files: &[PathBuf],
    ) -> Result<JobHandle, DispatchError>;
}

// drives the scheduler's command line submitter
#[derive(Debug, Clone)]
pub struct FarmDispatcher {
    program: PathBuf,

    timeout: Option<Duration>,
}

impl FarmDispatcher {
    pub fn new(program: impl Into<PathBuf>, timeout: Option<Duration>) -> Self {
        FarmDispatcher {
            program: program.into(),
            timeout,
        }
    }

    // <$DEADLINE_PATH>/deadlinecommand[.exe]
    pub fn from_environment(
        environment: &Environment,
        settings: &Settings,
    ) -> Result<Self, ConfigurationError> {
        let install_dir = environment
            .deadline_path
            .as_ref()
            .ok_or(ConfigurationError::MissingEnv(DEADLINE_PATH_VAR))?;
        let program = install_dir.join(format!(
            "{}{}",
            settings.farm.command_name,
            env::consts::EXE_SUFFIX
        ));
        Ok(FarmDispatcher::new(program, settings.farm.dispatch_timeout()))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn run(&self, cmd: Command) -> Result<Output, DispatchError> {
        let runtime = runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.output(cmd))
    }

    // the deadline covers reading the pipes too, so a grandchild holding
    // them open can't keep us waiting
    async fn output(&self, mut cmd: Command) -> Result<Output, DispatchError> {
        let child = cmd
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| DispatchError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        let output = child.wait_with_output();
        match self.timeout {
            None => Ok(output.await?),

            Some(after) => match timeout(after, output).await {
                Ok(output) => Ok(output?),

                Err(_) => {
                    //@ dropping the child kills it
                    warn!("Scheduler command is still running after {after:?}, killing it.");
                    Err(DispatchError::Timeout { after })
                },
            },
        }
    }
}

impl Dispatch for FarmDispatcher {
    fn dispatch(
        &self,
        description_files: &[PathBuf],
        auxiliary_files: &[PathBuf],
    ) -> Result<JobHandle, DispatchError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(description_files)
            .args(auxiliary_files)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        info!(
            "Running `{}`",
            command_line(&self.program, description_files, auxiliary_files)
        );
        let output = self.run(cmd)?;
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        if false == output.status.success() {
            return Err(DispatchError::Failed {
                status: output.status,
                output: text,
            });
        }
        parse_job_id(&text)
            .ok_or(DispatchError::MissingJobId { output: text })
    }
}

// pretends to submit; every call gets a fresh synthetic id
#[derive(Debug, Clone, Default)]
pub struct DryRunDispatcher {
    program: Option<PathBuf>,
}

impl DryRunDispatcher {
    pub fn new(program: Option<PathBuf>) -> Self {
        DryRunDispatcher { program }
    }
}

impl Dispatch for DryRunDispatcher {
    fn dispatch(
        &self,
        description_files: &[PathBuf],
        auxiliary_files: &[PathBuf],
    ) -> Result<JobHandle, DispatchError> {
        let program = self
            .program
            .clone()
            .unwrap_or_else(|| PathBuf::from("deadlinecommand"));
        info!(
            "[dry run] Would run `{}`",
            command_line(&program, description_files, auxiliary_files)
        );
        //@ 4 hex digits are plenty to tell stages apart in a report
        Ok(JobHandle::new(format!(
            "dry-{}",
            &Uuid::new_v4().simple().to_string()[..4]
        )))
    }
}

// first whitespace token that mentions the marker and has a value after
// its last `=` wins; incidental matches elsewhere in the output would be
// taken too
pub fn parse_job_id(output: &str) -> Option<JobHandle> {
    output
        .split_whitespace()
        .filter(|token| token.contains(JOB_ID_MARKER))
        .find_map(|token| match token.rsplit_once('=') {
            Some((_, id)) if false == id.is_empty() => Some(JobHandle::new(id)),

            _ => {
                debug!("Skipping malformed job id token `{token}`.");
                None
            },
        })
}

fn command_line(
    program: &Path,
    description_files: &[PathBuf],
    auxiliary_files: &[PathBuf],
) -> String {
    let mut line = program.display().to_string();
    for file in description_files.iter().chain(auxiliary_files) {
        line.push(' ');
        line.push_str(&file.display().to_string());
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_deadline_output() {
        let output = "Submitting to Repository: /mnt/repo\n\
                      Result=Success\n\
                      JobID=64f1c2a9e0b1d2000f3a5b77\n\
                      The job was submitted successfully.\n";
        assert_eq!(
            parse_job_id(output),
            Some(JobHandle::new("64f1c2a9e0b1d2000f3a5b77"))
        );
    }

    #[test]
    fn malformed_marker_tokens_are_skipped() {
        let output = "JobID: JobID= JobID=abc123 JobID=def456";
        assert_eq!(parse_job_id(output), Some(JobHandle::new("abc123")));
    }

    #[test]
    fn first_marker_token_wins_even_when_incidental() {
        // the marker is not anchored to a field, so this is taken as the id
        let output = "OldJobID=stale JobID=fresh";
        assert_eq!(parse_job_id(output), Some(JobHandle::new("stale")));
    }

    #[test]
    fn value_after_last_equals_sign_is_the_id() {
        assert_eq!(parse_job_id("JobID=a=b"), Some(JobHandle::new("b")));
        // nothing after the last `=`, so the token is skipped
        assert_eq!(parse_job_id("JobID=a= JobID=c"), Some(JobHandle::new("c")));
    }

    #[test]
    fn no_marker_means_no_id() {
        assert_eq!(parse_job_id("Error: pool `x` does not exist"), None);
        assert_eq!(parse_job_id(""), None);
    }

    #[test]
    fn missing_install_dir_is_a_configuration_error() {
        let err = FarmDispatcher::from_environment(
            &Environment::default(),
            &Settings::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingEnv("DEADLINE_PATH")));
    }

    #[test]
    fn program_is_resolved_inside_install_dir() {
        let environment = Environment {
            deadline_path: Some(PathBuf::from("/opt/Thinkbox/Deadline10/bin")),
            ..Default::default()
        };
        let mut settings = Settings::default();
        settings.farm.dispatch_timeout_secs = Some(5);
        let dispatcher = FarmDispatcher::from_environment(&environment, &settings).unwrap();
        assert_eq!(
            dispatcher.program(),
            PathBuf::from(format!(
                "/opt/Thinkbox/Deadline10/bin/deadlinecommand{}",
                env::consts::EXE_SUFFIX
            ))
        );
        assert_eq!(dispatcher.timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn spawn_failure() {
        let dispatcher = FarmDispatcher::new("/no/such/deadlinecommand", None);
        let err = dispatcher
            .dispatch(&[PathBuf::from("a.job")], &[])
            .unwrap_err();
        assert!(matches!(err, DispatchError::Spawn { .. }));
    }

    #[test]
    fn dry_run_hands_out_distinct_ids() {
        let dispatcher = DryRunDispatcher::default();
        let files = [PathBuf::from("job_info.job"), PathBuf::from("plugin_info.job")];
        let a = dispatcher.dispatch(&files, &[]).unwrap();
        let b = dispatcher.dispatch(&files, &[]).unwrap();
        assert!(a.as_str().starts_with("dry-"));
        assert_eq!(a.as_str().len(), 8);
        // 16 bits of randomness, a clash here is vanishingly rare
        assert_ne!(a, b);
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::{
            fs,
            os::unix::fs::PermissionsExt,
            time::Instant,
        };

        fn fake_cli(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("deadlinecommand");
            fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[test]
        fn passes_files_and_reads_job_id() {
            let dir = tempfile::tempdir().unwrap();
            let args_log = dir.path().join("args.log");
            let program = fake_cli(
                dir.path(),
                &format!(
                    "echo \"$@\" > {}\necho Result=Success\necho JobID=job-42",
                    args_log.display()
                ),
            );
            let dispatcher = FarmDispatcher::new(program, None);
            let handle = dispatcher
                .dispatch(
                    &[PathBuf::from("ji.job"), PathBuf::from("pi.job")],
                    &[PathBuf::from("publish.py")],
                )
                .unwrap();
            assert_eq!(handle, JobHandle::new("job-42"));
            assert_eq!(
                fs::read_to_string(args_log).unwrap().trim(),
                "ji.job pi.job publish.py"
            );
        }

        #[test]
        fn job_id_on_stderr_is_found() {
            let dir = tempfile::tempdir().unwrap();
            let program = fake_cli(dir.path(), "echo noise\necho JobID=err-1 >&2");
            let dispatcher = FarmDispatcher::new(program, Some(Duration::from_secs(10)));
            let handle = dispatcher.dispatch(&[], &[]).unwrap();
            assert_eq!(handle.as_str(), "err-1");
        }

        #[test]
        fn output_without_job_id() {
            let dir = tempfile::tempdir().unwrap();
            let program = fake_cli(dir.path(), "echo Result=Failure");
            let err = FarmDispatcher::new(program, None)
                .dispatch(&[], &[])
                .unwrap_err();
            match err {
                DispatchError::MissingJobId { output } => {
                    assert!(output.contains("Result=Failure"))
                },
                other => panic!("unexpected error: {other:?}"),
            }
        }

        #[test]
        fn non_zero_exit() {
            let dir = tempfile::tempdir().unwrap();
            let program = fake_cli(dir.path(), "echo JobID=nope\nexit 3");
            let err = FarmDispatcher::new(program, None)
                .dispatch(&[], &[])
                .unwrap_err();
            assert!(matches!(err, DispatchError::Failed { .. }));
        }

        #[test]
        fn hung_command_times_out() {
            let dir = tempfile::tempdir().unwrap();
            let program = fake_cli(dir.path(), "exec sleep 30");
            let started = Instant::now();
            let err = FarmDispatcher::new(program, Some(Duration::from_millis(200)))
                .dispatch(&[], &[])
                .unwrap_err();
            assert!(matches!(err, DispatchError::Timeout { .. }));
            assert!(started.elapsed() < Duration::from_secs(10));
        }

        #[test]
        fn background_process_holding_the_pipes_times_out() {
            let dir = tempfile::tempdir().unwrap();
            // the CLI itself exits at once but leaves stdout open behind it
            let program = fake_cli(dir.path(), "echo JobID=x\n(sleep 30 &)\nexit 0");
            let started = Instant::now();
            let err = FarmDispatcher::new(program, Some(Duration::from_millis(500)))
                .dispatch(&[], &[])
                .unwrap_err();
            assert!(matches!(err, DispatchError::Timeout { .. }), "{err:?}");
            assert!(started.elapsed() < Duration::from_secs(10));
        }
    }
}
