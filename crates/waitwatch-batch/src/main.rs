use anyhow::Result;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use waitwatch_alert::batch::CancellationToken;
use waitwatch_batch::config::BatchConfig;

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  waitwatch-batch [config.toml]    Evaluate every subject in the contexts file");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("waitwatch=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config_path = match args.get(1).map(|s| s.as_str()) {
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(path) => path,
        None => "config/batch.toml",
    };

    let config = BatchConfig::load(config_path)?;
    waitwatch_common::id::init(config.id.machine_id, config.id.node_id);

    tracing::info!(
        config = config_path,
        rules = %config.rules_path,
        contexts = %config.contexts_path,
        max_concurrent = config.engine.max_concurrent,
        "Starting batch evaluation"
    );

    // Ctrl-C stops subjects that have not started yet
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling remaining subjects");
            on_signal.cancel();
        }
    });

    let mut stdout = std::io::stdout().lock();
    let report = waitwatch_batch::run_batch(&config, &cancel, &mut stdout).await?;

    tracing::info!(
        completed = report.completed,
        failed = report.failed,
        cancelled = report.cancelled,
        alerts = report.alerts_triggered,
        "Batch finished"
    );
    Ok(())
}
