//! Protocol probe: size, range support and filename before a transfer.
//!
//! HTTP(S) sends a HEAD request; FTP logs in and asks for SIZE. A failed
//! probe never fails the task: `probe` degrades to "no resume, unknown size"
//! and the controller falls back to a single stream.

mod ftp;
mod headers;
mod http;

use serde::Serialize;
use std::time::Duration;

use crate::error::EngineError;
use crate::url_model::{parse_download_url, Transport};

/// What the probe learned about a remote resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProbeInfo {
    /// Server advertised `Accept-Ranges: bytes` (always true for FTP).
    pub supports_resume: bool,
    /// 0 when unknown.
    pub content_length: u64,
    pub content_type: String,
    pub filename: Option<String>,
}

impl ProbeInfo {
    /// Result used when probing fails.
    pub fn degraded() -> Self {
        Self::default()
    }

    /// Whether the resource can be split into parallel ranged requests.
    pub fn allows_parallel(&self, transport: Transport) -> bool {
        transport == Transport::Http && self.supports_resume && self.content_length > 0
    }
}

/// Probes `url`, returning the degraded result on any failure.
pub fn probe(url: &str, timeout: Duration) -> ProbeInfo {
    match try_probe(url, timeout) {
        Ok(info) => {
            tracing::debug!(
                url,
                content_length = info.content_length,
                supports_resume = info.supports_resume,
                "probe ok"
            );
            info
        }
        Err(e) => {
            let degraded = EngineError::ProbeDegraded(e.to_string());
            tracing::warn!(url, "{}", degraded);
            ProbeInfo::degraded()
        }
    }
}

/// Probes `url` and reports failures. Runs in the current thread.
pub fn try_probe(url: &str, timeout: Duration) -> Result<ProbeInfo, EngineError> {
    let (parsed, transport) = parse_download_url(url)?;
    match transport {
        Transport::Http => http::probe_http(parsed.as_str(), timeout),
        Transport::Ftp => ftp::probe_ftp(&parsed, timeout),
    }
}
