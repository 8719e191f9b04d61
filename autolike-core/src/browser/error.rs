use chromiumoxide::error::CdpError;
use thiserror::Error;

pub type BrowserResult<T> = Result<T, BrowserError>;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("chromium launch failed: {0}")]
    Launch(String),
    #[error("cdp error: {0}")]
    Cdp(#[source] CdpError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("element not found: {0}")]
    NotFound(String),
    #[error("timeout waiting for {0}")]
    Timeout(String),
    #[error("script failure: {0}")]
    Script(String),
    #[error("no tab at index {0}")]
    NoSuchTab(usize),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl BrowserError {
    /// The element or page the caller wanted is not there (absent or never
    /// appeared in time). Callers recover locally from these.
    pub fn is_target_unavailable(&self) -> bool {
        matches!(self, BrowserError::NotFound(_) | BrowserError::Timeout(_))
    }
}

/// CDP request timeouts, page loads included, become [`BrowserError::Timeout`].
impl From<CdpError> for BrowserError {
    fn from(err: CdpError) -> Self {
        match err {
            CdpError::Timeout => BrowserError::Timeout("cdp request".to_string()),
            other => BrowserError::Cdp(other),
        }
    }
}

impl From<tokio::task::JoinError> for BrowserError {
    fn from(err: tokio::task::JoinError) -> Self {
        BrowserError::Unexpected(err.to_string())
    }
}
