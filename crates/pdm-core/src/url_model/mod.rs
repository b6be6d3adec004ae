//! URL modeling: accepted schemes and local filename derivation.
//!
//! Only `http`, `https` and `ftp` are accepted. Derived filenames come from
//! the probe hint (Content-Disposition or URL path) and are sanitized for
//! Linux; names without an extension fall back to `download_<unix-seconds>`.

mod disposition;
mod ftp;
mod path;
mod sanitize;

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::EngineError;

pub use disposition::parse_content_disposition_filename;
pub use ftp::{FtpLogin, ANONYMOUS_PASSWORD, ANONYMOUS_USER, DEFAULT_FTP_PORT};
pub use path::filename_from_url_path;
pub use sanitize::sanitize_filename;

/// Wire protocol family of a download URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// `http` or `https`.
    Http,
    Ftp,
}

/// Parses `url` and checks it uses an accepted scheme with a host.
pub fn parse_download_url(url: &str) -> Result<(url::Url, Transport), EngineError> {
    let parsed =
        url::Url::parse(url.trim()).map_err(|e| EngineError::InvalidUrl(format!("{url}: {e}")))?;
    let transport = match parsed.scheme() {
        "http" | "https" => Transport::Http,
        "ftp" => Transport::Ftp,
        other => return Err(EngineError::UnsupportedScheme(other.to_string())),
    };
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(EngineError::InvalidUrl(format!("{url}: missing host")));
    }
    Ok((parsed, transport))
}

/// Picks a safe local filename for `url`.
///
/// `hint` is the probe's filename (Content-Disposition, else URL path). When
/// it is absent the URL path is used directly.
pub fn derive_filename(url: &str, hint: Option<&str>) -> String {
    let candidate = hint
        .map(str::to_string)
        .filter(|s| !s.trim().is_empty())
        .or_else(|| filename_from_url_path(url))
        .map(|raw| sanitize_filename(&raw))
        .unwrap_or_default();

    if candidate.is_empty() || !candidate.contains('.') {
        fallback_filename(SystemTime::now())
    } else {
        candidate
    }
}

/// `download_<unix-seconds>` for `at`.
pub fn fallback_filename(at: SystemTime) -> String {
    let secs = at.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
    format!("download_{secs}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn accepted_schemes() {
        assert_eq!(
            parse_download_url("https://example.com/a.bin").unwrap().1,
            Transport::Http
        );
        assert_eq!(
            parse_download_url("HTTP://example.com/a.bin").unwrap().1,
            Transport::Http
        );
        assert_eq!(
            parse_download_url("ftp://ftp.example.org/pub/a.gz").unwrap().1,
            Transport::Ftp
        );
    }

    #[test]
    fn rejected_schemes_and_garbage() {
        assert!(matches!(
            parse_download_url("file:///etc/passwd"),
            Err(EngineError::UnsupportedScheme(s)) if s == "file"
        ));
        assert!(matches!(
            parse_download_url("sftp://host/x"),
            Err(EngineError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            parse_download_url("not a url"),
            Err(EngineError::InvalidUrl(_))
        ));
    }

    #[test]
    fn hint_overrides_url_path() {
        assert_eq!(
            derive_filename("https://example.com/dl?id=7", Some("assembly.fa")),
            "assembly.fa"
        );
        assert_eq!(
            derive_filename("https://example.com/archive.tar.gz", None),
            "archive.tar.gz"
        );
    }

    #[test]
    fn hint_is_sanitized() {
        assert_eq!(
            derive_filename("https://example.com/", Some("../../secret.txt")),
            "secret.txt"
        );
    }

    #[test]
    fn names_without_extension_fall_back() {
        assert!(derive_filename("https://example.com/download", None).starts_with("download_"));
        assert!(derive_filename("https://example.com/", None).starts_with("download_"));
        assert_eq!(
            fallback_filename(UNIX_EPOCH + Duration::from_secs(42)),
            "download_42"
        );
    }
}
