use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use gazecal::{batch::Batch, Layout, Settings};

#[derive(Parser)]
#[command(name = "precision", about = "Score model predictions against cleaned eye data")]
struct Args {
    /// Derivatives root
    #[arg(long)]
    derivatives: PathBuf,

    /// Subject ids; defaults to `subjects` from the settings
    #[arg(long, value_delimiter = ',')]
    subjects: Vec<String>,

    /// Subtasks to score
    #[arg(long, value_delimiter = ',', default_value = "fixation,pursuit,freeview")]
    subtasks: Vec<String>,

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
    let cfg = settings.resolve()?;
    let layout = Layout::new(&args.derivatives, &args.task);
    let batch = Batch::new(&layout, &settings, &cfg);

    let subjects = if args.subjects.is_empty() { &settings.subjects } else { &args.subjects };
    for subject in subjects {
        for subtask in &args.subtasks {
            match batch.evaluate_subject(subject, subtask) {
                Ok((sweep, one)) => {
                    let mean = one.mean().and_then(|m| m.first().copied()).unwrap_or(f64::NAN);
                    println!(
                        "{subject} {subtask}: {} runs, {:.3} under {} dva",
                        sweep.len(),
                        mean,
                        cfg.eval.threshold
                    );
                }
                Err(e) => {
                    if matches!(gazecal::classify(&e), Some(gazecal::PipelineError::Configuration(_))) {
                        return Err(e);
                    }
                    tracing::warn!(subject = %subject, subtask = %subtask, error = %format!("{e:#}"), "subject skipped");
                }
            }
        }
    }
    Ok(())
}
