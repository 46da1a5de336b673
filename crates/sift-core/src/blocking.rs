//! Offloading CPU-bound work from the async runtime.
//!
//! HTML parsing of fetched pages is the main user: documents can be large and
//! the parsed tree is not `Send`, so it is built and consumed entirely on
//! Tokio's blocking threadpool.

use crate::Error;

/// Execute a CPU-intensive closure on Tokio's blocking threadpool.
///
/// # Example
///
/// ```ignore
/// let text = run_blocking(move || extract_page_text(&html, 8000)).await?;
/// ```
pub async fn run_blocking<F, T>(f: F) -> Result<T, Error>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Unknown(format!("Blocking task failed: {}", e)))
}
