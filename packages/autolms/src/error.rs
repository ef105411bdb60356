use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// 포털이 계정 정보를 거부함
    #[error("Portal rejected the credentials of {0}")]
    AuthenticationFailed(String),
    /// 요청 도중 세션이 만료되어 로그인 페이지가 반환됨
    #[error("Portal session expired while requesting {url}")]
    SessionExpired { url: String },
    #[error("Request to {url} timed out")]
    Timeout { url: String },
    #[error("Request error: {0}")]
    Request(reqwest::Error),
    #[error("Invalid portal URL: {0}")]
    InvalidUrl(String),
    #[error("Article store error: {0}")]
    Store(String),
    #[error("Crawl cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout {
                url: err.url().map(ToString::to_string).unwrap_or_default(),
            }
        } else {
            Error::Request(err)
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::InvalidUrl(err.to_string())
    }
}

impl Error {
    /// Errors that end a course crawl instead of being absorbed per entry.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::AuthenticationFailed(_) | Error::SessionExpired { .. } | Error::Cancelled
        )
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(self, Error::SessionExpired { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_errors() {
        assert!(Error::AuthenticationFailed("20241234".to_string()).is_fatal());
        assert!(
            Error::SessionExpired {
                url: "/ilos/st/course/notice_list_form.acl".to_string()
            }
            .is_fatal()
        );
        assert!(Error::Cancelled.is_fatal());
        assert!(
            !Error::Timeout {
                url: "/ilos/co/efile_list.acl".to_string()
            }
            .is_fatal()
        );
        assert!(!Error::Store("offline".to_string()).is_fatal());
    }
}
