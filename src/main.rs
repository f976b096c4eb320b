// src/main.rs

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use probesweep::core::input::{parse_terms_inline, read_terms};
use probesweep::core::models::{MatchRecord, OutputFormat, ScanPhase, ScanSettings, ScanSnapshot};
use probesweep::core::retention::{DEFAULT_RESULTS_TTL, sweep_stale_results};
use probesweep::core::sink::MatchObserver;
use probesweep::{OutputTarget, ScanCoordinator, ScanHandle, ScanRegistry, logging};

const BANNER: &str = r#"
###########
# HTTP response scanner
#
# Probes every domain over http and https and reports the ones whose
# responses contain any of the search terms.
#
# Use at your own risk. Only scan hosts you are authorised to test.
###########
"#;

#[derive(Parser, Debug)]
#[command(name = "probesweep", version, about = "Bulk HTTP(S) response scanner")]
struct Cli {
    /// Also print log events to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan a list of domains for search terms
    Scan(ScanArgs),
    /// Delete result files older than a given age
    Prune(PruneArgs),
}

#[derive(Args, Debug)]
#[command(group(clap::ArgGroup::new("term_source").required(true).args(["searchterms", "terms"])))]
struct ScanArgs {
    /// Input file containing domains, one per line
    #[arg(short, long, default_value = "input.txt")]
    inputfile: PathBuf,

    /// Output file
    #[arg(short, long, default_value = "output.txt")]
    outputfile: PathBuf,

    /// Number of domains probed concurrently
    #[arg(short, long, default_value_t = probesweep::core::models::DEFAULT_CONCURRENCY)]
    threads: usize,

    /// File containing search terms, one per line
    #[arg(short, long)]
    searchterms: Option<PathBuf>,

    /// Comma-separated search terms
    #[arg(long)]
    terms: Option<String>,

    /// Optional port number
    #[arg(short, long, value_parser = clap::value_parser!(u16).range(1..))]
    port: Option<u16>,

    /// Optional path to append to the URL
    #[arg(short, long)]
    append: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 5.0)]
    timeout: f64,

    /// Write only the domain of each match
    #[arg(long)]
    domain_only: bool,

    /// Print the final scan summary as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct PruneArgs {
    /// Directory holding results_*.txt files
    #[arg(long, default_value = ".")]
    dir: PathBuf,

    /// Maximum age in seconds
    #[arg(long, default_value_t = DEFAULT_RESULTS_TTL.as_secs())]
    max_age_secs: u64,
}

/// Prints matches above the progress bar instead of through it.
struct ProgressObserver {
    bar: ProgressBar,
}

impl MatchObserver for ProgressObserver {
    fn on_match(&self, record: &MatchRecord) {
        info!("{}", record.notification());
        self.bar.println(record.notification());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let log_path = logging::initialize_logging(cli.verbose)?;
    info!(log = %log_path.display(), "Logging initialized.");

    match cli.command {
        Commands::Scan(args) => scan(args).await,
        Commands::Prune(args) => prune(args).await,
    }
}

async fn scan(args: ScanArgs) -> Result<()> {
    println!("{BANNER}");

    let terms = match (&args.searchterms, &args.terms) {
        (Some(path), _) => read_terms(path).await?,
        (None, Some(inline)) => parse_terms_inline(inline),
        (None, None) => return Err(eyre!("no search terms given")),
    };
    let timeout = Duration::try_from_secs_f64(args.timeout)
        .wrap_err_with(|| format!("invalid timeout: {}", args.timeout))?;
    let format = if args.domain_only {
        OutputFormat::DomainOnly
    } else {
        OutputFormat::WithTerms
    };

    let settings = ScanSettings::builder(terms)
        .port(args.port)
        .path_append(args.append)
        .concurrency_limit(args.threads)
        .timeout(timeout)
        .output_format(format)
        .build()?;

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let registry = Arc::new(ScanRegistry::new());
    let coordinator = ScanCoordinator::new(registry)
        .with_observer(Arc::new(ProgressObserver { bar: bar.clone() }));
    let handle = coordinator.start_from_file(
        args.inputfile.clone(),
        settings,
        OutputTarget::File(args.outputfile.clone()),
    )?;

    println!("Scanning...");
    let summary = watch_scan(&coordinator, &handle, &bar, tokio::signal::ctrl_c()).await;
    bar.finish_and_clear();
    report(&summary, args.json)?;

    match summary.phase {
        ScanPhase::Failed => Err(eyre!(
            "scan failed: {}",
            summary.error.unwrap_or_else(|| "unknown error".to_string())
        )),
        _ => Ok(()),
    }
}

/// Drives the progress bar until the scan ends. `shutdown` resolving
/// cancels the scan; it is created once so a signal between ticks is not
/// lost, and not polled again after it fired.
async fn watch_scan<F: Future>(
    coordinator: &ScanCoordinator,
    handle: &ScanHandle,
    bar: &ProgressBar,
    shutdown: F,
) -> ScanSnapshot {
    tokio::pin!(shutdown);
    let mut cancelling = false;
    let mut ticker = tokio::time::interval(Duration::from_millis(200));
    loop {
        tokio::select! {
            _ = &mut shutdown, if !cancelling => {
                cancelling = true;
                bar.println("Cancelling, waiting for in-flight probes...");
                coordinator.cancel(handle);
            }
            _ = ticker.tick() => {
                let snapshot = coordinator.snapshot(handle);
                bar.set_length(snapshot.total as u64);
                bar.set_position(snapshot.completed as u64);
                bar.set_message(format!("{} found", snapshot.results_total));
                if snapshot.phase.is_terminal() {
                    break;
                }
            }
        }
    }
    handle.wait().await
}

fn report(summary: &ScanSnapshot, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }
    match summary.phase {
        ScanPhase::Completed => println!("Finished"),
        ScanPhase::Cancelled => println!("Cancelled"),
        _ => {}
    }
    println!(
        "{}/{} domains scanned, {} matched. Results in {}",
        summary.completed,
        summary.total,
        summary.results_total,
        summary.output_path.display()
    );
    Ok(())
}

async fn prune(args: PruneArgs) -> Result<()> {
    let removed = sweep_stale_results(&args.dir, Duration::from_secs(args.max_age_secs))
        .await
        .wrap_err_with(|| format!("cannot sweep {}", args.dir.display()))?;
    println!("Removed {} stale result file(s) from {}", removed.len(), args.dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use clap::CommandFactory;
    use probesweep::ScanRequest;
    use probesweep::core::error::ProbeFailure;
    use probesweep::core::models::{ProbeOutcome, Protocol};
    use probesweep::core::scanner::Prober;
    use tokio_util::sync::CancellationToken;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn scan_defaults() {
        let cli = Cli::try_parse_from(["probesweep", "scan", "-s", "terms.txt"]).unwrap();
        let Commands::Scan(args) = cli.command else { panic!("expected scan") };
        assert_eq!(args.inputfile, PathBuf::from("input.txt"));
        assert_eq!(args.outputfile, PathBuf::from("output.txt"));
        assert_eq!(args.threads, 200);
        assert_eq!(args.timeout, 5.0);
        assert!(args.port.is_none());
    }

    #[test]
    fn terms_are_required() {
        assert!(Cli::try_parse_from(["probesweep", "scan"]).is_err());
        assert!(Cli::try_parse_from(["probesweep", "scan", "--terms", "Apache"]).is_ok());
    }

    #[test]
    fn port_zero_is_rejected() {
        assert!(Cli::try_parse_from(["probesweep", "scan", "--terms", "a", "-p", "0"]).is_err());
        assert!(Cli::try_parse_from(["probesweep", "scan", "--terms", "a", "-p", "8080"]).is_ok());
    }

    /// Never answers; gives up only when the scan is cancelled.
    struct Stalled;

    #[async_trait]
    impl Prober for Stalled {
        async fn probe(&self, _: &str, _: Protocol, cancel: &CancellationToken) -> ProbeOutcome {
            cancel.cancelled().await;
            Err(ProbeFailure::cancelled())
        }
    }

    fn start(coordinator: &ScanCoordinator, dir: &std::path::Path, domains: Vec<String>) -> ScanHandle {
        let settings = ScanSettings::builder(["x"]).build().unwrap();
        coordinator
            .start_with_prober(
                ScanRequest::new(domains, settings),
                OutputTarget::Directory(dir.to_path_buf()),
                Arc::new(Stalled),
            )
            .unwrap()
    }

    #[tokio::test]
    async fn shutdown_signal_cancels_a_running_scan() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = ScanCoordinator::new(Arc::new(ScanRegistry::new()));
        let handle = start(&coordinator, dir.path(), vec!["a.example".to_string()]);

        let summary = watch_scan(&coordinator, &handle, &ProgressBar::hidden(), std::future::ready(())).await;

        assert_eq!(summary.phase, ScanPhase::Cancelled);
        assert_eq!(summary.completed, 0);
        assert!(handle.is_cancel_requested());
    }

    #[tokio::test]
    async fn scan_ends_on_its_own_without_a_signal() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = ScanCoordinator::new(Arc::new(ScanRegistry::new()));
        let handle = start(&coordinator, dir.path(), Vec::new());

        let summary =
            watch_scan(&coordinator, &handle, &ProgressBar::hidden(), std::future::pending::<()>()).await;

        assert_eq!(summary.phase, ScanPhase::Completed);
        assert!(!handle.is_cancel_requested());
    }
}
