// src/core/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// A domain that could not be converted to its ASCII form. Skips that
/// domain only.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid domain {input:?}: {reason}")]
pub struct InvalidDomainError {
    pub input: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ProbeFailureKind {
    Timeout,
    #[strum(serialize = "connection error")]
    Connection,
    Cancelled,
}

/// Why a single (domain, protocol) attempt produced no response. Never
/// fatal: the attempt simply yields no match.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct ProbeFailure {
    pub kind: ProbeFailureKind,
    pub message: String,
}

impl ProbeFailure {
    pub fn new(kind: ProbeFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self::new(ProbeFailureKind::Cancelled, "scan cancelled")
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == ProbeFailureKind::Cancelled
    }
}

/// Problems detected before any domain is probed.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("no search terms provided")]
    EmptyTerms,
    #[error("search terms must not be empty strings")]
    BlankTerm,
    #[error("concurrency limit must be greater than zero")]
    ZeroConcurrency,
    #[error("invalid port number: {0}")]
    InvalidPort(u32),
    #[error("timeout must be greater than zero")]
    InvalidTimeout,
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("cannot read {path}: {source}")]
    UnreadableInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The output destination could not be written.
#[derive(Debug, Error)]
#[error("cannot write results to {path}: {source}")]
pub struct SinkWriteError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Failures that abort a whole scan.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Sink(#[from] SinkWriteError),
}
