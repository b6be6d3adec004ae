//! Turn collected HEAD response header lines into probe metadata.

use super::ProbeInfo;
use crate::url_model::parse_content_disposition_filename;

/// Parses header lines as delivered by curl's header callback.
///
/// With redirects curl reports every hop; a status line (`HTTP/...`) starts
/// a new response, so only the last response's headers are kept.
pub(super) fn parse_headers(lines: &[String]) -> ProbeInfo {
    let mut info = ProbeInfo::default();

    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("HTTP/") {
            info = ProbeInfo::default();
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        let value = value.trim();
        if name.eq_ignore_ascii_case("content-length") {
            info.content_length = value.parse::<u64>().unwrap_or(0);
        } else if name.eq_ignore_ascii_case("accept-ranges") {
            info.supports_resume = value
                .split(',')
                .any(|unit| unit.trim().eq_ignore_ascii_case("bytes"));
        } else if name.eq_ignore_ascii_case("content-type") {
            info.content_type = value.to_string();
        } else if name.eq_ignore_ascii_case("content-disposition") {
            info.filename = parse_content_disposition_filename(value);
        }
    }

    info
}
