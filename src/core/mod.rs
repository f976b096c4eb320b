// src/core/mod.rs

/// Data structures shared by every stage: requests, probe results, match
/// records and scan snapshots.
pub mod models;

/// Error taxonomy. Per-domain and per-probe errors stay local; configuration
/// and output errors end the scan.
pub mod error;

/// Readers for domain and term lists.
pub mod input;

/// The per-domain pipeline stages.
pub mod scanner;

/// Append-only result output.
pub mod sink;

/// Bounded-concurrency scan driver and scan handles.
pub mod coordinator;

/// Caller-owned store of running and finished scans.
pub mod registry;

/// Cleanup of old result files.
pub mod retention;
