use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;
use gazecal::{model::load_subject_dataset, run_training, CommandService, Layout, Settings};

#[derive(Parser)]
#[command(name = "train", about = "Build training datasets and run the external model")]
struct Args {
    /// Derivatives root
    #[arg(long)]
    derivatives: PathBuf,

    /// Training/evaluation program, called as `<program> <args...> <work_dir>`
    #[arg(long)]
    program: PathBuf,

    /// Extra arguments passed before the work directory
    #[arg(long, allow_hyphen_values = true, num_args = 0..)]
    program_args: Vec<String>,

    /// Exchange directory (default: <derivatives>/deepmreye_calib/pp_data)
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Subject ids; defaults to `subjects` from the settings
    #[arg(long, value_delimiter = ',')]
    subjects: Vec<String>,

    #[arg(long, default_value = "DeepMReyeCalib")]
    task: String,

    /// Settings JSON
    #[arg(long, default_value = "settings.json")]
    settings: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let settings = Settings::load(&args.settings)?;
    settings.resolve()?;
    let layout = Layout::new(&args.derivatives, &args.task);

    let subjects = if args.subjects.is_empty() { &settings.subjects } else { &args.subjects };
    if subjects.is_empty() {
        bail!("no subjects given");
    }
    let datasets: Vec<_> = subjects
        .iter()
        .map(|s| load_subject_dataset(&layout, s, settings.num_run))
        .collect();

    let work_dir = args
        .work_dir
        .unwrap_or_else(|| layout.calib_dir().join("pp_data"));
    let mut service = CommandService::new(&args.program, work_dir);
    service.args = args.program_args;

    let evaluations = run_training(&mut service, &layout, &datasets, &settings.hyperparameters)?;
    println!("{} of {} subjects evaluated", evaluations.len(), subjects.len());
    Ok(())
}
