// src/core/coordinator.rs

//! Drives a scan across the whole domain list.
//!
//! Every domain runs through normalize -> probe (http, then https) -> match
//! -> merge -> append, as its own task. A semaphore bounds how many domains
//! are in flight, and a scan-scoped cancellation token stops dispatch and
//! interrupts probes at their next await point.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::error::{ScanError, SinkWriteError};
use crate::core::input::read_domains;
use crate::core::models::{
    MatchRecord, Protocol, RESULTS_PREVIEW_LIMIT, ScanId, ScanPhase, ScanRequest, ScanSettings,
    ScanSnapshot,
};
use crate::core::registry::ScanRegistry;
use crate::core::retention::results_file_name;
use crate::core::scanner::dedup::{SeenDomains, merge_domain_hits};
use crate::core::scanner::matcher::TermMatcher;
use crate::core::scanner::normalizer::normalize_domain;
use crate::core::scanner::probe::{HttpProber, Prober};
use crate::core::sink::{LogObserver, MatchObserver, ResultSink};

// --- Scan Handle ---

/// Where a scan writes its matches.
#[derive(Debug, Clone)]
pub enum OutputTarget {
    /// Exactly this file.
    File(PathBuf),
    /// `results_{scan id}.txt` inside this directory.
    Directory(PathBuf),
}

impl OutputTarget {
    fn resolve(&self, id: ScanId) -> PathBuf {
        match self {
            OutputTarget::File(path) => path.clone(),
            OutputTarget::Directory(dir) => dir.join(results_file_name(id)),
        }
    }
}

/// Progress state of one scan. Written by the scan's tasks, read by
/// snapshots; locks are only held for a push or a bounded clone.
#[derive(Debug)]
struct ScanProgress {
    id: ScanId,
    output_path: PathBuf,
    total: AtomicUsize,
    completed: AtomicUsize,
    results: RwLock<Vec<MatchRecord>>,
    phase: watch::Sender<ScanPhase>,
    error: Mutex<Option<String>>,
    started_at: DateTime<Utc>,
    finished_at: Mutex<Option<DateTime<Utc>>>,
}

impl ScanProgress {
    fn new(id: ScanId, output_path: PathBuf, total: usize) -> Self {
        let (phase, _) = watch::channel(ScanPhase::Pending);
        Self {
            id,
            output_path,
            total: AtomicUsize::new(total),
            completed: AtomicUsize::new(0),
            results: RwLock::new(Vec::new()),
            phase,
            error: Mutex::new(None),
            started_at: Utc::now(),
            finished_at: Mutex::new(None),
        }
    }

    /// Marks one domain's pipeline as done.
    fn record_completion(&self, record: Option<MatchRecord>) {
        if let Some(record) = record {
            self.results
                .write()
                .unwrap_or_else(|p| p.into_inner())
                .push(record);
        }
        self.completed.fetch_add(1, Ordering::AcqRel);
    }

    fn phase(&self) -> ScanPhase {
        *self.phase.borrow()
    }

    fn set_phase(&self, phase: ScanPhase) {
        if phase.is_terminal() {
            *self.finished_at.lock().unwrap_or_else(|p| p.into_inner()) = Some(Utc::now());
        }
        self.phase.send_replace(phase);
    }

    fn fail(&self, message: String) {
        error!(scan_id = %self.id, error = %message, "Scan failed.");
        *self.error.lock().unwrap_or_else(|p| p.into_inner()) = Some(message);
        self.set_phase(ScanPhase::Failed);
    }

    fn snapshot(&self, preview: usize) -> ScanSnapshot {
        let phase = self.phase();
        let (results, results_total) = {
            let results = self.results.read().unwrap_or_else(|p| p.into_inner());
            (
                results.iter().take(preview).cloned().collect::<Vec<_>>(),
                results.len(),
            )
        };
        ScanSnapshot {
            id: self.id,
            phase,
            total: self.total.load(Ordering::Acquire),
            completed: self.completed.load(Ordering::Acquire),
            results,
            results_total,
            is_complete: phase == ScanPhase::Completed,
            output_path: self.output_path.clone(),
            error: self.error.lock().unwrap_or_else(|p| p.into_inner()).clone(),
            started_at: self.started_at,
            finished_at: *self.finished_at.lock().unwrap_or_else(|p| p.into_inner()),
        }
    }
}

/// Caller-side handle to a running scan. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ScanHandle {
    progress: Arc<ScanProgress>,
    cancel: CancellationToken,
}

impl ScanHandle {
    pub fn id(&self) -> ScanId {
        self.progress.id
    }

    pub fn output_path(&self) -> &Path {
        &self.progress.output_path
    }

    pub fn phase(&self) -> ScanPhase {
        self.progress.phase()
    }

    /// Stops dispatching new domains and interrupts in-flight probes.
    /// A no-op once the scan has finished.
    pub fn cancel(&self) {
        if !self.phase().is_terminal() {
            info!(scan_id = %self.id(), "Cancellation requested.");
        }
        self.cancel.cancel();
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Progress with the default bounded preview of results.
    pub fn snapshot(&self) -> ScanSnapshot {
        self.progress.snapshot(RESULTS_PREVIEW_LIMIT)
    }

    pub fn snapshot_with_preview(&self, preview: usize) -> ScanSnapshot {
        self.progress.snapshot(preview)
    }

    /// Waits until the scan reaches a terminal phase and returns the final
    /// snapshot.
    pub async fn wait(&self) -> ScanSnapshot {
        let mut rx = self.progress.phase.subscribe();
        // The sender lives in `progress`, which `self` keeps alive.
        let _ = rx.wait_for(|phase| phase.is_terminal()).await;
        self.snapshot()
    }
}

// --- Per-domain Pipeline ---

enum DomainOutcome {
    /// The pipeline ran to the end, with or without a match.
    Finished(Option<MatchRecord>),
    /// Cancellation cut a probe short; the domain does not count as done.
    Interrupted,
}

struct DomainPipeline {
    prober: Arc<dyn Prober>,
    matcher: TermMatcher,
    sink: ResultSink,
    seen: SeenDomains,
    cancel: CancellationToken,
}

impl DomainPipeline {
    async fn run(&self, raw: &str) -> Result<DomainOutcome, SinkWriteError> {
        let domain = match normalize_domain(raw) {
            Ok(domain) => domain,
            Err(e) => {
                warn!(error = %e, "Skipping invalid domain.");
                return Ok(DomainOutcome::Finished(None));
            }
        };

        if !self.seen.claim(&domain) {
            debug!(domain = %domain, "Domain already scanned, skipping duplicate.");
            return Ok(DomainOutcome::Finished(None));
        }

        let mut hits = Vec::new();
        for protocol in Protocol::probe_order() {
            match self.prober.probe(&domain, protocol, &self.cancel).await {
                Ok(response) => {
                    let terms = self.matcher.find_matches(&response.body, &response.headers);
                    debug!(
                        domain = %domain,
                        %protocol,
                        status = response.status,
                        matches = terms.len(),
                        "Probe finished."
                    );
                    hits.extend(MatchRecord::new(&domain, protocol, terms));
                }
                Err(failure) if failure.is_cancelled() => {
                    debug!(domain = %domain, %protocol, "Probe interrupted by cancellation.");
                    return Ok(DomainOutcome::Interrupted);
                }
                Err(failure) => {
                    warn!(url = %format!("{protocol}://{domain}"), error = %failure, "Error scanning.");
                }
            }
        }

        let Some(record) = merge_domain_hits(hits) else {
            return Ok(DomainOutcome::Finished(None));
        };
        self.sink.append(&record).await?;
        Ok(DomainOutcome::Finished(Some(record)))
    }
}

// --- Coordinator ---

enum DomainSource {
    List(Vec<String>),
    File(PathBuf),
}

/// Starts scans and keeps their handles in the injected registry.
pub struct ScanCoordinator {
    registry: Arc<ScanRegistry>,
    observer: Arc<dyn MatchObserver>,
}

impl std::fmt::Debug for ScanCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanCoordinator")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl ScanCoordinator {
    pub fn new(registry: Arc<ScanRegistry>) -> Self {
        Self {
            registry,
            observer: Arc::new(LogObserver),
        }
    }

    /// Replaces the default log-only match notification.
    pub fn with_observer(mut self, observer: Arc<dyn MatchObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn registry(&self) -> &Arc<ScanRegistry> {
        &self.registry
    }

    /// Starts a scan probing over HTTP. Must be called inside a Tokio
    /// runtime.
    ///
    /// # Errors
    /// Returns a configuration error when the settings are invalid or the
    /// HTTP client cannot be built; the scan never starts in that case.
    pub fn start(&self, request: ScanRequest, output: OutputTarget) -> Result<ScanHandle, ScanError> {
        request.settings().validate()?;
        let prober = HttpProber::from_settings(request.settings())?;
        self.start_with_prober(request, output, Arc::new(prober))
    }

    /// Starts a scan with a caller-supplied prober.
    ///
    /// # Errors
    /// Settings are public and may have changed since `build()`, so they
    /// are checked again; invalid ones are rejected before anything is
    /// registered.
    pub fn start_with_prober(
        &self,
        request: ScanRequest,
        output: OutputTarget,
        prober: Arc<dyn Prober>,
    ) -> Result<ScanHandle, ScanError> {
        request.settings().validate()?;
        let (domains, settings) = request.into_parts();
        let total = domains.len();
        Ok(self.launch(DomainSource::List(domains), total, settings, output, prober))
    }

    /// Starts a scan whose domain list is read inside the scan task. An
    /// unreadable list moves the scan to `Failed`.
    pub fn start_from_file(
        &self,
        domains: PathBuf,
        settings: ScanSettings,
        output: OutputTarget,
    ) -> Result<ScanHandle, ScanError> {
        settings.validate()?;
        let prober = HttpProber::from_settings(&settings)?;
        Ok(self.launch(DomainSource::File(domains), 0, settings, output, Arc::new(prober)))
    }

    pub fn cancel(&self, handle: &ScanHandle) {
        handle.cancel();
    }

    pub fn snapshot(&self, handle: &ScanHandle) -> ScanSnapshot {
        handle.snapshot()
    }

    fn launch(
        &self,
        source: DomainSource,
        total: usize,
        settings: ScanSettings,
        output: OutputTarget,
        prober: Arc<dyn Prober>,
    ) -> ScanHandle {
        let id = Uuid::new_v4();
        let progress = Arc::new(ScanProgress::new(id, output.resolve(id), total));
        let handle = ScanHandle {
            progress: progress.clone(),
            cancel: CancellationToken::new(),
        };
        self.registry.insert(handle.clone());

        let cancel = handle.cancel.clone();
        let observer = self.observer.clone();
        tokio::spawn(async move {
            run_scan(progress, cancel, source, settings, prober, observer).await;
        });
        handle
    }
}

async fn run_scan(
    progress: Arc<ScanProgress>,
    cancel: CancellationToken,
    source: DomainSource,
    settings: ScanSettings,
    prober: Arc<dyn Prober>,
    observer: Arc<dyn MatchObserver>,
) {
    progress.set_phase(ScanPhase::Running);

    let domains = match source {
        DomainSource::List(domains) => domains,
        DomainSource::File(path) => match read_domains(&path).await {
            Ok(domains) => {
                progress.total.store(domains.len(), Ordering::Release);
                domains
            }
            Err(e) => return progress.fail(e.to_string()),
        },
    };

    let sink = match ResultSink::create(&progress.output_path, settings.output_format, observer).await {
        Ok(sink) => sink,
        Err(e) => return progress.fail(e.to_string()),
    };

    info!(
        scan_id = %progress.id,
        domains = domains.len(),
        terms = settings.terms.len(),
        concurrency = settings.concurrency_limit,
        output = %progress.output_path.display(),
        "Scan started."
    );

    let pipeline = Arc::new(DomainPipeline {
        prober,
        matcher: TermMatcher::new(settings.terms.clone()),
        sink,
        seen: SeenDomains::new(),
        cancel: cancel.clone(),
    });

    if let Err(e) = dispatch(&progress, &pipeline, &cancel, domains, settings.concurrency_limit).await {
        return progress.fail(e.to_string());
    }
    if let Err(e) = pipeline.sink.sync().await {
        return progress.fail(e.to_string());
    }

    let snapshot = progress.snapshot(0);
    if cancel.is_cancelled() {
        info!(
            scan_id = %progress.id,
            completed = snapshot.completed,
            total = snapshot.total,
            "Scan cancelled."
        );
        progress.set_phase(ScanPhase::Cancelled);
    } else {
        info!(
            scan_id = %progress.id,
            completed = snapshot.completed,
            matches = snapshot.results_total,
            "Scan completed."
        );
        progress.set_phase(ScanPhase::Completed);
    }
}

/// Runs every domain under the concurrency budget. Returns the first sink
/// failure, after which nothing new is dispatched.
async fn dispatch(
    progress: &Arc<ScanProgress>,
    pipeline: &Arc<DomainPipeline>,
    cancel: &CancellationToken,
    domains: Vec<String>,
    concurrency_limit: usize,
) -> Result<(), SinkWriteError> {
    let semaphore = Arc::new(Semaphore::new(concurrency_limit.min(Semaphore::MAX_PERMITS)));
    let mut tasks: JoinSet<Result<(), SinkWriteError>> = JoinSet::new();
    let mut first_error: Option<SinkWriteError> = None;

    for raw in domains {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let pipeline = pipeline.clone();
        let task_progress = progress.clone();
        tasks.spawn(async move {
            let _permit = permit;
            match pipeline.run(&raw).await {
                Ok(DomainOutcome::Finished(record)) => task_progress.record_completion(record),
                Ok(DomainOutcome::Interrupted) => {}
                Err(e) => {
                    // Before the permit is released, so no further domain
                    // gets dispatched.
                    pipeline.cancel.cancel();
                    return Err(e);
                }
            }
            Ok(())
        });

        while let Some(joined) = tasks.try_join_next() {
            collect(joined, progress, cancel, &mut first_error);
        }
    }

    while let Some(joined) = tasks.join_next().await {
        collect(joined, progress, cancel, &mut first_error);
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn collect(
    joined: Result<Result<(), SinkWriteError>, tokio::task::JoinError>,
    progress: &ScanProgress,
    cancel: &CancellationToken,
    first_error: &mut Option<SinkWriteError>,
) {
    match joined {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            if first_error.is_none() {
                error!(error = %e, "Output destination failed, stopping scan.");
                cancel.cancel();
                *first_error = Some(e);
            }
        }
        // A panicking domain is done, just without a match.
        Err(e) => {
            error!(error = %e, "Domain task aborted.");
            progress.record_completion(None);
        }
    }
}
