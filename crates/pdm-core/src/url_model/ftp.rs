//! FTP login defaults.

use super::path::percent_decode_lossy;

pub const ANONYMOUS_USER: &str = "anonymous";
pub const ANONYMOUS_PASSWORD: &str = "anonymous@";
pub const DEFAULT_FTP_PORT: u16 = 21;

/// Credentials for an `ftp://` URL: the URL's userinfo when present, else
/// anonymous login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtpLogin {
    pub username: String,
    pub password: String,
}

impl FtpLogin {
    pub fn from_url(url: &url::Url) -> Self {
        let username = match url.username() {
            "" => ANONYMOUS_USER.to_string(),
            user => percent_decode_lossy(user),
        };
        let password = url
            .password()
            .map(percent_decode_lossy)
            .unwrap_or_else(|| ANONYMOUS_PASSWORD.to_string());
        Self { username, password }
    }
}
