//! CLI subcommands.

pub mod download;
pub mod extract;
pub mod install;
pub mod update;
pub mod url;

use std::sync::Arc;

use sbcman::config::ConfigFile;
use sbcman::manager::HttpClient;

/// HTTP client honoring the configured timeout.
fn http_client(config: &ConfigFile) -> Arc<HttpClient> {
    Arc::new(HttpClient::with_timeout(config.timeout))
}

/// Fire `cancel` on Ctrl-C. Failure to install the handler is not fatal.
fn on_interrupt<F>(cancel: F)
where
    F: Fn() + Send + 'static,
{
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\nCancelling...");
        cancel();
    }) {
        tracing::warn!(error = %e, "Failed to install Ctrl-C handler");
    }
}
