// src/core/scanner/mod.rs

// The leaf stages of the per-domain pipeline. The coordinator chains them:
// normalizer -> probe -> matcher -> dedup.
pub mod dedup;
pub mod matcher;
pub mod normalizer;
pub mod probe;

pub use self::dedup::{SeenDomains, merge_domain_hits};
pub use self::matcher::{TermMatcher, serialize_headers};
pub use self::normalizer::normalize_domain;
pub use self::probe::{HttpProber, Prober, build_target_url};
