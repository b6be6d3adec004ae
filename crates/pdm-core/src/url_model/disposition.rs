//! `Content-Disposition` filename extraction.

use super::path::percent_decode_lossy;

/// Extracts the filename parameter from a raw `Content-Disposition` value.
///
/// `filename*=UTF-8''...` (RFC 5987) wins over `filename=`. Plain values may
/// be double-quoted, single-quoted or bare; escaped quotes inside a quoted
/// value are unescaped and percent-escapes are decoded.
pub fn parse_content_disposition_filename(header_value: &str) -> Option<String> {
    let mut plain: Option<String> = None;

    for param in header_value.split(';').map(str::trim) {
        let Some((name, value)) = param.split_once('=') else {
            continue;
        };
        let name = name.trim().to_ascii_lowercase();
        let value = value.trim();

        match name.as_str() {
            "filename*" => {
                let lower = value.to_ascii_lowercase();
                if let Some(encoded) = lower
                    .starts_with("utf-8''")
                    .then(|| &value["utf-8''".len()..])
                {
                    let decoded = percent_decode_lossy(strip_quotes(encoded));
                    if !decoded.is_empty() {
                        return Some(decoded);
                    }
                }
            }
            "filename" => {
                let unquoted = unescape(strip_quotes(value));
                let decoded = percent_decode_lossy(&unquoted);
                if !decoded.is_empty() {
                    plain = Some(decoded);
                }
            }
            _ => {}
        }
    }

    plain
}

fn strip_quotes(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut escaped = false;
    for c in value.chars() {
        if escaped {
            if c != '"' && c != '\\' {
                out.push('\\');
            }
            out.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else {
            out.push(c);
        }
    }
    if escaped {
        out.push('\\');
    }
    out
}
