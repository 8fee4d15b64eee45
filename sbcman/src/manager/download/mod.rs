//! Background acquisition of catalog items.
//!
//! This module provides:
//! - The single-flight [`DownloadManager`] (`manager`)
//! - Task lifecycle tracking with an atomic state (`state`)
//! - The staged 60/40 progress model shared with self-update (`progress`)
//! - The observer interface and its channel adapter (`observer`)
//!
//! # Architecture
//!
//! ```text
//! DownloadManager::download(item, observer)
//!         │
//!         ├── AtomicTaskState::try_start   (refuse if Running)
//!         │
//!         └── worker thread
//!                 ├── NetworkClient::download     0.0 ─► 0.6
//!                 ├── PackageInstaller::install   0.6 ─► 1.0
//!                 ├── GameCatalog upsert + save   (failures logged)
//!                 └── RunGuard drop               (leave Running, progress = 0)
//! ```

mod manager;
mod observer;
mod progress;
mod state;

pub use manager::{shared_catalog, DownloadManager, SharedCatalog};
pub use observer::{ChannelObserver, DownloadEvent, DownloadObserver};
pub use progress::{ProgressEvent, Stage, StagedProgress, DOWNLOAD_STAGE_SHARE};
pub use state::{AtomicTaskState, TaskState};
