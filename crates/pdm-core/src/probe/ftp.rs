//! FTP probe: log in and ask for SIZE without retrieving the file.

use std::time::Duration;

use super::ProbeInfo;
use crate::error::EngineError;
use crate::retry::TransferError;
use crate::url_model::{filename_from_url_path, FtpLogin};

pub(super) fn probe_ftp(url: &url::Url, timeout: Duration) -> Result<ProbeInfo, EngineError> {
    let login = FtpLogin::from_url(url);

    let mut easy = curl::easy::Easy::new();
    easy.url(url.as_str()).map_err(TransferError::from)?;
    easy.username(&login.username).map_err(TransferError::from)?;
    easy.password(&login.password).map_err(TransferError::from)?;
    // No body: curl sends SIZE (and MDTM) but skips RETR.
    easy.nobody(true).map_err(TransferError::from)?;
    easy.connect_timeout(timeout).map_err(TransferError::from)?;
    easy.timeout(timeout).map_err(TransferError::from)?;
    easy.perform().map_err(TransferError::from)?;

    let size = easy.content_length_download().map_err(TransferError::from)?;
    Ok(ProbeInfo {
        supports_resume: true,
        content_length: if size > 0.0 { size as u64 } else { 0 },
        content_type: String::new(),
        filename: filename_from_url_path(url.as_str()),
    })
}
