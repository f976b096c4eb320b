// src/lib.rs

//! Bulk domain probing: fetch every domain of a list over HTTP and HTTPS,
//! look for literal search terms in the responses and record the hits.

pub mod core;
pub mod logging;

pub use crate::core::coordinator::{OutputTarget, ScanCoordinator, ScanHandle};
pub use crate::core::models::{MatchRecord, ScanPhase, ScanRequest, ScanSettings, ScanSnapshot};
pub use crate::core::registry::ScanRegistry;
