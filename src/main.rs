use std::path::{
    Path,
    PathBuf,
};

use anyhow::Context;
use clap::{
    Parser,
    Subcommand,
};
use log::info;
use tracing_subscriber::EnvFilter;

use shotfarm::{
    job::SubmissionContext,
    load_job,
    publish::publish_dir,
    Dispatch,
    DryRunDispatcher,
    Environment,
    FarmDispatcher,
    JobDescriptionWriter,
    Pipeline,
    Settings,
    Stage,
};

// CLI
#[derive(Parser, Debug)]
#[command(name = "shotfarm")]
#[command(version = "0.1")]
#[command(about = "Submits shot preview renders to the Deadline farm: \
                   render, transcode to a movie, and publish for review.",
          long_about = None)
]
struct Cli {
    /// Settings file, otherwise $SHOTFARM_SETTINGS or ~/.shotfarm/settings.toml
    #[arg(short, long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write the job files and submit them to the farm
    Submit {
        /// The job file on disk
        #[arg(short, long)]
        job_file: PathBuf,

        /// Write every file but don't run the scheduler command
        #[arg(long, action)]
        dry_run: bool,
    },

    /// Check a job file without writing anything
    Validate {
        /// The job file on disk
        #[arg(short, long)]
        job_file: PathBuf,
    },

    /// Print where a submission would write its files
    Paths {
        /// The job file on disk
        #[arg(short, long)]
        job_file: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();
    let environment = Environment::capture();
    let settings = Settings::discover(cli.settings.as_deref(), &environment)?;

    match cli.command {
        Commands::Submit { job_file, dry_run } => {
            let context = load_valid_job(&job_file, &settings)?;
            let temp_root = environment.temp_root(&settings, &context.app_version)?;
            info!("Job files go to `{}`", temp_root.display());
            let writer = JobDescriptionWriter::new(temp_root);
            if true == dry_run {
                let program = FarmDispatcher::from_environment(&environment, &settings)
                    .ok()
                    .map(|d| d.program().to_path_buf());
                submit(Pipeline::new(writer, DryRunDispatcher::new(program), settings), &context)
            } else {
                // resolved before anything is written
                let dispatcher = FarmDispatcher::from_environment(&environment, &settings)?;
                submit(Pipeline::new(writer, dispatcher, settings), &context)
            }
        },

        Commands::Validate { job_file } => {
            let context = load_valid_job(&job_file, &settings)?;
            let stages: Vec<String> = Stage::planned(&context)
                .iter()
                .map(|s| s.to_string())
                .collect();
            println!(
                "`{}` is valid, stages: {}",
                job_file.display(),
                stages.join(" -> ")
            );
            Ok(())
        },

        Commands::Paths { job_file } => {
            let context = load_job(&job_file)?;
            let temp_root = environment.temp_root(&settings, &context.app_version)?;
            let writer = JobDescriptionWriter::new(&temp_root);
            println!("temp root: {}", temp_root.display());
            for stage in Stage::planned(&context) {
                let files = writer.file_paths(&stage.to_string(), &context.file_name, &context.camera);
                println!("{stage} job info: {}", files.job_info.display());
                println!("{stage} plugin info: {}", files.plugin_info.display());
            }
            if let Some(review) = context.review.as_ref().filter(|_| context.publish_movie) {
                let dir = publish_dir(&temp_root, review);
                println!("publish script: {}", dir.join(format!("{}.py", context.file_name)).display());
            }
            Ok(())
        },
    }
}

fn load_valid_job(
    job_file: &Path,
    settings: &Settings,
) -> anyhow::Result<SubmissionContext> {
    let context = load_job(job_file)?;
    context
        .validate(settings)
        .with_context(|| format!("`{}` can't be submitted", job_file.display()))?;
    Ok(context)
}

// prints what made it to the farm, even when a later stage failed
fn submit<D: Dispatch>(
    pipeline: Pipeline<D>,
    context: &SubmissionContext,
) -> anyhow::Result<()> {
    match pipeline.submit(context) {
        Ok(report) => {
            println!("{report}");
            Ok(())
        },

        Err(e) => {
            if false == e.completed.is_empty() {
                println!("{}", e.completed);
            }
            Err(e.into())
        },
    }
}
