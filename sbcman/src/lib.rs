//! SBC-Man - game and self-update delivery for single-board handhelds
//!
//! This library implements the acquisition and installation pipeline used by
//! the SBC-Man launcher: streaming downloads, validated archive extraction,
//! fallback-aware installation, and the self-update flow.
//!
//! # Architecture
//!
//! ```text
//! DownloadManager ─────┐          ┌───── UpdateService
//!   (game bundles)     │          │   (self-update wheels)
//!                      ▼          ▼
//!               NetworkClient  PackageInstaller
//!               (HttpClient)        │
//!                                   ├── TrustedInstaller (pip)
//!                                   └── ManualExtraction
//!                                           │
//!                                    ArchiveExtractor
//!                                    (MemberValidator)
//! ```
//!
//! The UI layer, hardware probing, and catalog storage live outside this
//! crate and are reached through the [`manager::DownloadObserver`] and
//! [`package::GameCatalog`] traits.

pub mod config;
pub mod logging;
pub mod manager;
pub mod package;
pub mod update;

/// Version of the running application, compared against the release feed.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
