//! Application self-update.
//!
//! ```text
//! check_for_update()                    start_update(url)
//!        │                                     │
//!        ▼                                     ▼
//!   api_url(repo) ── fetch_text ──►  download ► updates_dir/<wheel>   [0.0, 0.6]
//!        │                                     │
//!   Release::parse                    PackageInstaller                 [0.6, 1.0]
//!        │                           (pip, then manual extraction
//!   compare_versions                  into site-packages)
//! ```
//!
//! Only one update runs at a time. Progress and stage are exposed through
//! [`UpdateService::status`] and the [`crate::manager::DownloadObserver`]
//! passed to [`UpdateService::start_update`].

mod release;
mod service;
mod version;

pub use release::{api_url, Asset, Release};
pub use service::{
    UpdateCheckResult, UpdateService, UpdateStage, UpdateStatus, DOWNLOADING_MESSAGE,
    INSTALLING_MESSAGE,
};
pub use version::compare_versions;
