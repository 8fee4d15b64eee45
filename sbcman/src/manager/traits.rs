//! Trait seams between the orchestrators and their collaborators.

use std::path::Path;

use tokio_util::sync::CancellationToken;

/// Progress callback invoked with `(bytes_downloaded, total_bytes)`.
///
/// `total_bytes` is 0 when the server did not announce a length.
pub type ProgressCallback<'a> = &'a mut dyn FnMut(u64, u64);

/// Minimal HTTP surface used by the download manager and update service.
///
/// Implementations never return errors: every transport or HTTP failure is
/// logged and reduced to `false` / `None`. There are no retries.
pub trait NetworkClient: Send + Sync {
    /// Stream `url` into `dest`, reporting progress after every chunk.
    ///
    /// Parent directories of `dest` are created as needed. The token is
    /// polled between chunks; a cancelled transfer returns `false`.
    fn download(
        &self,
        url: &str,
        dest: &Path,
        on_progress: ProgressCallback<'_>,
        cancel: &CancellationToken,
    ) -> bool;

    /// HEAD request; true only for a 2xx status.
    fn check(&self, url: &str) -> bool;

    /// HEAD request returning `Content-Length`.
    ///
    /// `None` if the header is absent, zero, or unparsable.
    fn size(&self, url: &str) -> Option<u64>;

    /// GET request returning the body as text.
    fn fetch_text(&self, url: &str) -> Option<String>;
}
