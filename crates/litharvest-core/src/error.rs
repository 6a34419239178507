//! Error type for external catalog calls

/// Error from a single call to an external catalog endpoint.
///
/// Distinguishes transient network failures (retried by
/// [`RetryPolicy`](crate::retry::RetryPolicy)) from terminal ones.
#[derive(Debug)]
pub enum FetchError {
    /// HTTP error with optional status code (None = connection-level failure)
    Http {
        status: Option<u16>,
        message: String,
    },
    /// I/O error, including read timeouts and truncated bodies
    Io(std::io::Error),
    /// Response body could not be decoded (malformed JSON/XML envelope)
    Decode(String),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http {
                status: Some(s),
                message,
            } => write!(f, "HTTP {s}: {message}"),
            Self::Http {
                status: None,
                message,
            } => write!(f, "HTTP error: {message}"),
            Self::Io(e) => write!(f, "IO error: {e}"),
            Self::Decode(msg) => write!(f, "decode error: {msg}"),
        }
    }
}

impl std::error::Error for FetchError {}

impl FetchError {
    /// Create from a reqwest error, keeping the status but not the URL
    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        Self::Http {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }

    /// Truncated response body: fewer bytes arrived than Content-Length promised.
    pub fn incomplete_body(got: u64, expected: u64) -> Self {
        Self::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("incomplete body: {got}/{expected} bytes"),
        ))
    }

    /// Whether a retry can plausibly succeed.
    ///
    /// Transient: connection-level failures (no status), 408/429/5xx,
    /// timeouts, resets, and truncated reads. Client errors (4xx) and
    /// malformed payloads are terminal.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http { status, .. } => {
                matches!(status, None | Some(408) | Some(429) | Some(500..=599))
            }
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::Interrupted
            ),
            Self::Decode(_) => false,
        }
    }
}

impl From<std::io::Error> for FetchError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
