use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use bugroute::classifier::{Classifier, IssueContent};
use bugroute::cli::{Cli, CliCommand};
use bugroute::config::Config;
use bugroute::error::{Error, Result};
use bugroute::policy::RoutingPolicy;
use bugroute::router::{RunMode, Router};
use bugroute::ticket::{AnyNotifier, ClickUpNotifier, NoopNotifier};
use bugroute::tracker::github::GitHubTracker;

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn classify(config: &Config, title: String, body: String, current: Option<String>) -> Result<()> {
    if let Some(ref current) = current {
        config.registry.lookup(current)?;
    }
    let classifier = Classifier::new(config.registry.clone(), config.match_mode)?;
    let policy = RoutingPolicy::new(config.thresholds);
    let candidates = classifier.classify(&IssueContent::new(title, body));
    let decision = policy.decide(candidates, current.as_deref());
    let json = serde_json::to_string_pretty(&decision)
        .map_err(|e| Error::Report(format!("failed to serialize decision: {e}")))?;
    println!("{json}");
    Ok(())
}

fn list_destinations(config: &Config) {
    for (id, dest) in config.registry.destinations() {
        let keywords: Vec<&str> = dest.keywords.iter().map(|k| k.as_str()).collect();
        println!("{id}\t{}\t{}", dest.repository, keywords.join(", "));
    }
}

async fn run_batch(config: Config, mode: RunMode) -> Result<()> {
    let notifier = match config.clickup {
        Some(ref clickup) if mode == RunMode::Route && !config.dry_run => {
            AnyNotifier::ClickUp(ClickUpNotifier::new(clickup)?)
        }
        _ => AnyNotifier::Noop(NoopNotifier),
    };
    let router = Router::new(GitHubTracker::new(), notifier, config)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing current issue");
            let _ = shutdown_tx.send(true);
        }
    });

    let report = router.run_once(mode, Some(shutdown_rx)).await?;
    println!("{}", report.to_json()?);
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging();

    let config = match Config::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    info!(
        destinations = config.registry.len(),
        repositories = config.repositories.len(),
        auto_threshold = config.thresholds.auto,
        manual_threshold = config.thresholds.manual,
        match_mode = config.match_mode.as_str(),
        dry_run = config.dry_run,
        "config loaded"
    );

    let result = match cli.command {
        CliCommand::Classify {
            title,
            body,
            current,
        } => classify(&config, title, body, current),
        CliCommand::Destinations => {
            list_destinations(&config);
            Ok(())
        }
        CliCommand::Scan => run_batch(config, RunMode::Scan).await,
        CliCommand::Route => run_batch(config, RunMode::Route).await,
    };

    if let Err(e) = result {
        if matches!(e, Error::Interrupted) {
            std::process::exit(130);
        }
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
