//! Acquisition and installation pipeline.
//!
//! Leaves first:
//!
//! - [`NetworkClient`] / [`HttpClient`]: streaming downloads and HEAD probes
//! - [`ArchiveExtractor`]: two-pass validated extraction
//! - [`PackageInstaller`]: ordered strategy chain over the extractor
//! - [`DownloadManager`]: background download + install of catalog items
//!
//! The self-update flow in [`crate::update`] reuses the network client,
//! installer and staged progress model from here.

pub mod config;
pub mod download;
pub mod error;
pub mod extractor;
pub mod installer;
pub mod network;
pub mod traits;

pub use config::{ExtractionLimits, ManagerConfig};
pub use download::{
    shared_catalog, ChannelObserver, DownloadEvent, DownloadManager, DownloadObserver,
    SharedCatalog, TaskState, DOWNLOAD_STAGE_SHARE,
};
pub use error::{ManagerError, ManagerResult};
pub use extractor::{ArchiveExtractor, ArchiveFormat, ExtractionReport};
pub use installer::{InstallRequest, InstallTarget, InstallationResult, PackageInstaller};
pub use network::HttpClient;
pub use traits::{NetworkClient, ProgressCallback};
