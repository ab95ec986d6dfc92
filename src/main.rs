use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

// Use library instead of local modules
use rpn_calculator::{
    init_tracing, BatchOutcome, BatchProgress, Calculator, SqliteHistoryStore, TelemetrySink,
    TracingSink,
};

/// RPN calculator with persistent history
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// SQLite database holding the calculation history
    #[arg(short, long, env = "RPN_DATABASE", default_value = "database.db")]
    database: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "RPN_LOG", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate one expression and store the result, e.g. "2 3 4 + *"
    Eval { expression: String },

    /// Validate several expressions, then evaluate them in the background
    Batch {
        #[arg(required = true)]
        expressions: Vec<String>,
    },

    /// Print the stored history, newest first
    History,

    /// Write the history as CSV (stdout when no file is given)
    Export { output: Option<PathBuf> },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let store = Arc::new(SqliteHistoryStore::open(&cli.database)?);
    let progress = Arc::new(BatchProgress::new(TracingSink));
    let calculator = Calculator::with_sink(store, progress.clone());

    match cli.command {
        Commands::Eval { expression } => {
            let record = blocking(&calculator, move |calc| Ok(calc.calculate(&expression)?)).await?;
            println!("{} = {}", record.expression, record.result);
        }
        Commands::Batch { expressions } => {
            run_batch(&calculator, &*progress, &expressions, BATCH_TIMEOUT).await?;
        }
        Commands::History => {
            for op in blocking(&calculator, |calc| calc.history()).await? {
                println!(
                    "#{:<5} {}  {} = {}",
                    op.id,
                    op.created_at.format("%Y-%m-%d %H:%M:%S"),
                    op.expression,
                    op.result
                );
            }
        }
        Commands::Export { output } => {
            let bytes = blocking(&calculator, |calc| calc.export_csv()).await?;
            match output {
                Some(path) => {
                    std::fs::write(&path, bytes)?;
                    println!("✓ History exported to {}", path.display());
                }
                None => print!("{}", String::from_utf8_lossy(&bytes)),
            }
        }
    }

    Ok(())
}

const BATCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Run a store-touching call on the blocking pool, as the server does
async fn blocking<T, F>(calculator: &Calculator, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&Calculator) -> Result<T> + Send + 'static,
{
    let calculator = calculator.clone();
    tokio::task::spawn_blocking(move || f(&calculator)).await?
}

/// Units run detached, so stay alive until every one of ours has settled
async fn run_batch<S: TelemetrySink>(
    calculator: &Calculator,
    progress: &BatchProgress<S>,
    expressions: &[String],
    timeout: Duration,
) -> Result<BatchOutcome> {
    let scheduled = calculator.calculate_batch(expressions)?;
    println!("Processing {} expressions", scheduled);

    let outcome = match progress.wait_for(scheduled, timeout).await {
        Some(outcome) => outcome,
        None => bail!(
            "timed out after {:?}: {} of {} expressions settled",
            timeout,
            progress.snapshot().settled(),
            scheduled
        ),
    };

    for record in &outcome.completed {
        println!("✓ #{} {} = {}", record.id, record.expression, record.result);
    }
    for (expression, reason) in &outcome.failed {
        eprintln!("✗ {}: {}", expression, reason);
    }

    if !outcome.failed.is_empty() {
        bail!("{} of {} expressions failed", outcome.failed.len(), scheduled);
    }

    Ok(outcome)
}
