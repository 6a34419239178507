//! HTTP facade over a shared async client.
//!
//! Uses async reqwest internally with tokio::time::timeout for stall
//! detection, but presents a sync interface so the rayon worker pool can
//! call it directly.

use std::sync::LazyLock;
use std::time::Duration;

use futures_util::StreamExt;

use crate::error::FetchError;

/// Per-chunk read timeout (no data for this long = stalled connection)
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Connect timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared async HTTP client with connection pooling.
static SHARED_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .pool_max_idle_per_host(4)
        .build()
        .expect("failed to build HTTP client")
});

/// Get shared HTTP client.
pub fn http_client() -> &'static reqwest::Client {
    &SHARED_CLIENT
}

/// Shared tokio runtime for HTTP operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// Execute a request and read the full body as text.
///
/// The body is streamed chunk-by-chunk with a per-chunk timeout, and the
/// byte count is checked against Content-Length, so a stalled or truncated
/// transfer surfaces as a transient [`FetchError`] instead of a silently
/// short payload. The caller retries the whole request, never a partial
/// resume (a truncated multi-record payload is useless).
pub fn fetch_text(req: reqwest::RequestBuilder) -> Result<String, FetchError> {
    SHARED_RUNTIME.handle().block_on(async {
        let response = req
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| FetchError::from_reqwest(&e))?;

        let expected = response.content_length();
        let mut body: Vec<u8> = Vec::with_capacity(expected.unwrap_or(8192) as usize);
        let mut stream = response.bytes_stream();

        loop {
            match tokio::time::timeout(READ_TIMEOUT, stream.next()).await {
                Ok(Some(Ok(chunk))) => body.extend_from_slice(&chunk),
                Ok(Some(Err(e))) => return Err(FetchError::from_reqwest(&e)),
                Ok(None) => break,
                Err(_) => {
                    return Err(FetchError::Io(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        format!("read timeout ({}s with no data)", READ_TIMEOUT.as_secs()),
                    )));
                }
            }
        }

        if let Some(expected) = expected {
            if (body.len() as u64) < expected {
                return Err(FetchError::incomplete_body(body.len() as u64, expected));
            }
        }

        String::from_utf8(body).map_err(|e| FetchError::Decode(format!("invalid UTF-8: {e}")))
    })
}
