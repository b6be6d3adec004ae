//! HTTP(S) probe: HEAD with redirects.

use std::time::Duration;

use super::{headers, ProbeInfo};
use crate::error::EngineError;
use crate::retry::TransferError;
use crate::transfer::USER_AGENT;
use crate::url_model::filename_from_url_path;

pub(super) fn probe_http(url: &str, timeout: Duration) -> Result<ProbeInfo, EngineError> {
    let mut lines: Vec<String> = Vec::new();

    let mut easy = curl::easy::Easy::new();
    easy.url(url).map_err(TransferError::from)?;
    easy.nobody(true).map_err(TransferError::from)?;
    easy.follow_location(true).map_err(TransferError::from)?;
    easy.max_redirections(10).map_err(TransferError::from)?;
    easy.useragent(USER_AGENT).map_err(TransferError::from)?;
    easy.connect_timeout(timeout).map_err(TransferError::from)?;
    easy.timeout(timeout).map_err(TransferError::from)?;

    {
        let mut transfer = easy.transfer();
        transfer
            .header_function(|data| {
                lines.push(String::from_utf8_lossy(data).trim_end().to_string());
                true
            })
            .map_err(TransferError::from)?;
        transfer.perform().map_err(TransferError::from)?;
    }

    let code = easy.response_code().map_err(TransferError::from)?;
    if !(200..300).contains(&code) {
        return Err(EngineError::Protocol(format!("HEAD returned HTTP {code}")));
    }

    let mut info = headers::parse_headers(&lines);
    if info.filename.is_none() {
        info.filename = filename_from_url_path(url);
    }
    Ok(info)
}
