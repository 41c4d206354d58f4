use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use gazecal::{batch::{Batch, OutputKind}, Layout, Settings};

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// Training label tensors
    Labels,
    /// Cleaned x/y timeseries
    Eyetracking,
}

#[derive(Parser)]
#[command(name = "preproc", about = "Eye-tracking preprocessing: labels or cleaned timeseries")]
struct Args {
    /// Directory holding the *_physio.tsv.gz / *_physioevents.tsv.gz files
    #[arg(long)]
    raw_dir: PathBuf,

    /// Derivatives root
    #[arg(long)]
    derivatives: PathBuf,

    /// Subject id, e.g. sub-01
    #[arg(long)]
    subject: String,

    /// Task label
    #[arg(long, default_value = "DeepMReyeCalib")]
    task: String,

    #[arg(long, value_enum, default_value_t = Mode::Eyetracking)]
    mode: Mode,

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
    let cfg = settings.resolve()?;
    let layout = Layout::new(&args.derivatives, &args.task);

    let kind = match args.mode {
        Mode::Labels => OutputKind::Labels,
        Mode::Eyetracking => OutputKind::Eyetracking,
    };
    let done = Batch::new(&layout, &settings, &cfg).preprocess_subject(&args.raw_dir, &args.subject, kind)?;
    println!("{}: {} of {} runs written", args.subject, done.len(), settings.num_run);
    Ok(())
}
