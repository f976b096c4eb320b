// src/core/scanner/probe.rs

use async_trait::async_trait;
use std::error::Error as _;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::core::error::{ConfigurationError, ProbeFailure, ProbeFailureKind};
use crate::core::models::{ProbeOutcome, ProbeResponse, Protocol, ScanSettings};
use crate::core::scanner::matcher::serialize_headers;

/// Performs a single GET against one (domain, protocol) pair.
///
/// Implementations make exactly one attempt and must give up at the next
/// suspension point once `cancel` fires, reporting `Cancelled`.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(
        &self,
        domain: &str,
        protocol: Protocol,
        cancel: &CancellationToken,
    ) -> ProbeOutcome;
}

/// Builds `{protocol}://{domain}[:{port}]/[{path}]`. Leading slashes of
/// `path` are stripped so `/admin` and `admin` produce the same URL.
pub fn build_target_url(
    protocol: Protocol,
    domain: &str,
    port: Option<u16>,
    path: Option<&str>,
) -> String {
    let mut url = format!("{protocol}://{domain}");
    if let Some(port) = port {
        url.push_str(&format!(":{port}"));
    }
    url.push('/');
    if let Some(path) = path {
        url.push_str(path.trim_start_matches('/'));
    }
    url
}

/// The reqwest-backed prober used for real scans.
///
/// Certificate verification is off: misconfigured and self-signed hosts
/// are exactly what gets scanned. Idle connections are not pooled since
/// every domain is a different host.
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: reqwest::Client,
    port: Option<u16>,
    path_append: Option<String>,
}

impl HttpProber {
    pub fn new(
        user_agent: &str,
        timeout: Duration,
        port: Option<u16>,
        path_append: Option<String>,
    ) -> Result<Self, ConfigurationError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .connect_timeout(timeout)
            .danger_accept_invalid_certs(true)
            .pool_max_idle_per_host(0)
            .build()?;
        Ok(Self {
            client,
            port,
            path_append,
        })
    }

    pub fn from_settings(settings: &ScanSettings) -> Result<Self, ConfigurationError> {
        Self::new(
            &settings.user_agent,
            settings.timeout,
            settings.port,
            settings.path_append.clone(),
        )
    }

    async fn fetch(&self, url: Url) -> Result<ProbeResponse, reqwest::Error> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let headers = serialize_headers(response.headers());
        debug!(status, url = %response.url(), "Received HTTP response.");
        let body = response.text().await?;
        Ok(ProbeResponse {
            status,
            body,
            headers,
        })
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(
        &self,
        domain: &str,
        protocol: Protocol,
        cancel: &CancellationToken,
    ) -> ProbeOutcome {
        if cancel.is_cancelled() {
            return Err(ProbeFailure::cancelled());
        }

        let raw = build_target_url(protocol, domain, self.port, self.path_append.as_deref());
        let url = Url::parse(&raw).map_err(|e| {
            ProbeFailure::new(ProbeFailureKind::Connection, format!("invalid url {raw}: {e}"))
        })?;

        debug!(url = %url, "Probing.");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProbeFailure::cancelled()),
            result = self.fetch(url) => result.map_err(classify_error),
        }
    }
}

fn classify_error(error: reqwest::Error) -> ProbeFailure {
    let kind = if error.is_timeout() {
        ProbeFailureKind::Timeout
    } else {
        ProbeFailureKind::Connection
    };
    ProbeFailure::new(kind, error_chain(&error))
}

/// reqwest's top-level message rarely names the cause (DNS, refused, TLS),
/// so the source chain is folded in.
fn error_chain(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
