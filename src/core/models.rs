// src/core/models.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use strum::{AsRefStr, Display, EnumIter, IntoEnumIterator};
use uuid::Uuid;

use crate::core::error::ConfigurationError;

// --- Defaults ---

/// Default number of domains probed at the same time.
pub const DEFAULT_CONCURRENCY: usize = 200;

/// Default per-probe timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Number of results included in a progress snapshot.
pub const RESULTS_PREVIEW_LIMIT: usize = 10;

/// Identifies the scanner to remote hosts. A desktop browser string keeps
/// naive bot filters from answering differently.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/86.0.4240.75 Safari/537.36";

/// Unique identifier of one scan.
pub type ScanId = Uuid;

// --- Protocols ---

/// The URL schemes tried against every domain. Declaration order is probe
/// order, which also decides which protocol a merged record reports.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    /// All protocols in probe order.
    pub fn probe_order() -> impl Iterator<Item = Protocol> {
        Protocol::iter()
    }
}

// --- Output ---

/// How a confirmed match is written to the output destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    /// `example.com: Apache, nginx`
    #[default]
    WithTerms,
    /// `example.com`
    DomainOnly,
}

// --- Scan Request ---

/// Immutable input of a scan: the domains, the terms and the probe settings.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    domains: Vec<String>,
    settings: ScanSettings,
}

/// Everything about a scan except the domain list. Split out so a domain
/// list can be loaded later, inside the scan task.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub terms: Vec<String>,
    pub port: Option<u16>,
    pub path_append: Option<String>,
    pub concurrency_limit: usize,
    pub timeout: Duration,
    pub output_format: OutputFormat,
    pub user_agent: String,
}

impl ScanSettings {
    /// Starts a builder for the given search terms.
    pub fn builder<I, S>(terms: I) -> ScanSettingsBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ScanSettingsBuilder {
            terms: terms.into_iter().map(Into::into).collect(),
            port: None,
            path_append: None,
            concurrency_limit: DEFAULT_CONCURRENCY,
            timeout: DEFAULT_TIMEOUT,
            output_format: OutputFormat::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigurationError> {
        if self.terms.is_empty() {
            return Err(ConfigurationError::EmptyTerms);
        }
        if self.terms.iter().any(|t| t.is_empty()) {
            return Err(ConfigurationError::BlankTerm);
        }
        if self.concurrency_limit == 0 {
            return Err(ConfigurationError::ZeroConcurrency);
        }
        if self.port == Some(0) {
            return Err(ConfigurationError::InvalidPort(0));
        }
        if self.timeout.is_zero() {
            return Err(ConfigurationError::InvalidTimeout);
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ScanSettingsBuilder {
    terms: Vec<String>,
    port: Option<u16>,
    path_append: Option<String>,
    concurrency_limit: usize,
    timeout: Duration,
    output_format: OutputFormat,
    user_agent: String,
}

impl ScanSettingsBuilder {
    pub fn port(mut self, port: Option<u16>) -> Self {
        self.port = port;
        self
    }

    pub fn path_append(mut self, path: Option<String>) -> Self {
        self.path_append = path.filter(|p| !p.is_empty());
        self
    }

    pub fn concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Validates the settings. Duplicate terms are dropped, keeping the
    /// first occurrence so configured order is preserved.
    pub fn build(self) -> Result<ScanSettings, ConfigurationError> {
        let mut terms: Vec<String> = Vec::with_capacity(self.terms.len());
        for term in self.terms {
            if !terms.contains(&term) {
                terms.push(term);
            }
        }
        let settings = ScanSettings {
            terms,
            port: self.port,
            path_append: self.path_append,
            concurrency_limit: self.concurrency_limit,
            timeout: self.timeout,
            output_format: self.output_format,
            user_agent: self.user_agent,
        };
        settings.validate()?;
        Ok(settings)
    }
}

impl ScanRequest {
    pub fn new(domains: Vec<String>, settings: ScanSettings) -> Self {
        Self { domains, settings }
    }

    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    pub fn into_parts(self) -> (Vec<String>, ScanSettings) {
        (self.domains, self.settings)
    }
}

// --- Probe Results ---

/// A response received from one (domain, protocol) probe. Any status code
/// counts, error pages are scanned like everything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
    pub status: u16,
    pub body: String,
    /// Headers serialised one per line as `name: value`.
    pub headers: String,
}

/// Outcome of one (domain, protocol) attempt.
pub type ProbeOutcome = Result<ProbeResponse, crate::core::error::ProbeFailure>;

// --- Match Records ---

/// A domain whose responses contained at least one search term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub domain: String,
    pub protocol: Protocol,
    pub matched_terms: Vec<String>,
}

impl MatchRecord {
    /// Builds a record, or `None` when nothing matched.
    pub fn new(domain: &str, protocol: Protocol, matched_terms: Vec<String>) -> Option<Self> {
        if matched_terms.is_empty() {
            return None;
        }
        Some(Self {
            domain: domain.to_string(),
            protocol,
            matched_terms,
        })
    }

    /// The line written to the output destination, newline included.
    pub fn output_line(&self, format: OutputFormat) -> String {
        match format {
            OutputFormat::WithTerms => {
                format!("{}: {}\n", self.domain, self.matched_terms.join(", "))
            }
            OutputFormat::DomainOnly => format!("{}\n", self.domain),
        }
    }

    /// Human-readable notification for a confirmed match.
    pub fn notification(&self) -> String {
        format!(
            "[*] Found: {} ({}) - Terms: {}",
            self.domain,
            self.protocol,
            self.matched_terms.join(", ")
        )
    }
}

// --- Scan Lifecycle ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum ScanPhase {
    Pending,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl ScanPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ScanPhase::Completed | ScanPhase::Cancelled | ScanPhase::Failed
        )
    }
}

/// Point-in-time view of a scan, cheap to take while probes are running.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSnapshot {
    pub id: ScanId,
    pub phase: ScanPhase,
    pub total: usize,
    pub completed: usize,
    /// The first few results, bounded by the preview limit.
    pub results: Vec<MatchRecord>,
    pub results_total: usize,
    pub is_complete: bool,
    pub output_path: PathBuf,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ScanSnapshot {
    /// Completion ratio in `0.0..=1.0`. An empty scan counts as done.
    pub fn progress(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.completed as f64 / self.total as f64
    }
}
