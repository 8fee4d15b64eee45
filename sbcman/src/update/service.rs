//! Self-update: check the release feed, download the wheel, install it.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use url::Url;

use super::release::{api_url, Release};
use super::version::compare_versions;
use crate::manager::config::ManagerConfig;
use crate::manager::download::{DownloadObserver, ProgressEvent, StagedProgress};
use crate::manager::error::{ManagerError, ManagerResult};
use crate::manager::installer::{InstallRequest, InstallTarget, PackageInstaller};
use crate::manager::traits::NetworkClient;

/// Message shown while the wheel downloads.
pub const DOWNLOADING_MESSAGE: &str = "Downloading update...";

/// Message shown while the wheel installs.
pub const INSTALLING_MESSAGE: &str = "Installing update...";

/// Outcome of a release feed check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateCheckResult {
    /// Whether the feed advertises a newer version.
    pub update_available: bool,
    /// Version from the feed, without the `v` prefix.
    pub latest_version: Option<String>,
    /// Download URL of the wheel asset.
    pub download_url: Option<String>,
}

/// Phase of the self-update flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateStage {
    /// Nothing running.
    #[default]
    Idle,
    /// Reading the release feed.
    Checking,
    /// Fetching the wheel.
    Downloading,
    /// Installing the wheel.
    Installing,
    /// Last update succeeded.
    Complete,
    /// Last update failed.
    Failed,
}

/// Snapshot of the update flow for the UI to poll.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdateStatus {
    /// Current phase.
    pub stage: UpdateStage,
    /// Global progress, `[0, 1]`.
    pub progress: f64,
    /// Human-readable status line.
    pub message: String,
}

/// Mutable state behind the service's mutex.
#[derive(Debug, Default)]
struct Shared {
    running: bool,
    status: UpdateStatus,
    cancel: CancellationToken,
}

/// Clears `running` however the worker exits.
struct RunningGuard<'a>(&'a Mutex<Shared>);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        let mut shared = self.0.lock();
        shared.running = false;
        if matches!(
            shared.status.stage,
            UpdateStage::Downloading | UpdateStage::Installing
        ) {
            shared.status.stage = UpdateStage::Failed;
        }
    }
}

/// Checks for and applies application updates.
pub struct UpdateService {
    repository_url: String,
    current_version: String,
    updates_dir: PathBuf,
    site_packages: Vec<PathBuf>,
    network: Arc<dyn NetworkClient>,
    installer: Arc<PackageInstaller>,
    shared: Arc<Mutex<Shared>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl UpdateService {
    /// Create a service for `repository_url`, comparing against this build's
    /// version.
    pub fn new(
        config: &ManagerConfig,
        repository_url: impl Into<String>,
        network: Arc<dyn NetworkClient>,
    ) -> Self {
        let repository_url = repository_url.into();
        info!(repository = %repository_url, "Update service initialized");

        Self {
            repository_url,
            current_version: crate::VERSION.to_string(),
            updates_dir: config.updates_dir(),
            site_packages: config.site_packages_dirs.clone(),
            network,
            installer: Arc::new(PackageInstaller::new(config)),
            shared: Arc::new(Mutex::new(Shared::default())),
            worker: Mutex::new(None),
        }
    }

    /// Override the version compared against the feed.
    pub fn with_current_version(mut self, version: impl Into<String>) -> Self {
        self.current_version = version.into();
        self
    }

    /// Replace the installer.
    pub fn with_installer(mut self, installer: PackageInstaller) -> Self {
        self.installer = Arc::new(installer);
        self
    }

    /// Version this service considers installed.
    pub fn current_version(&self) -> &str {
        &self.current_version
    }

    /// Directory downloaded wheels are stored in.
    pub fn updates_dir(&self) -> &PathBuf {
        &self.updates_dir
    }

    /// Query the release feed.
    ///
    /// Every failure (network, bad JSON, missing tag or wheel) yields the
    /// empty result.
    pub fn check_for_update(&self) -> UpdateCheckResult {
        self.set_idle_stage(UpdateStage::Checking, "Checking for updates...");
        let result = self.query_feed();
        self.set_idle_stage(UpdateStage::Idle, "");
        result
    }

    fn query_feed(&self) -> UpdateCheckResult {
        let api = api_url(&self.repository_url);
        info!(url = %api, "Checking for updates");

        let Some(body) = self.network.fetch_text(&api) else {
            error!(url = %api, "Failed to fetch release feed");
            return UpdateCheckResult::default();
        };

        let release = match Release::parse(&body) {
            Ok(release) => release,
            Err(e) => {
                error!(error = %e, "Invalid release feed");
                return UpdateCheckResult::default();
            }
        };

        let Some(latest) = release.version() else {
            warn!("No version tag found in release");
            return UpdateCheckResult::default();
        };

        let Some(wheel) = release.wheel() else {
            warn!("No wheel file found in release assets");
            return UpdateCheckResult::default();
        };

        let update_available = compare_versions(&self.current_version, latest);
        info!(
            current = %self.current_version,
            latest,
            update_available,
            "Release feed checked"
        );

        UpdateCheckResult {
            update_available,
            latest_version: Some(latest.to_string()),
            download_url: Some(wheel.browser_download_url.clone()),
        }
    }

    /// Update the stage only while no update runs.
    fn set_idle_stage(&self, stage: UpdateStage, message: &str) {
        let mut shared = self.shared.lock();
        if !shared.running {
            shared.status.stage = stage;
            shared.status.message = message.to_string();
        }
    }

    /// Download and install the wheel at `download_url` on a background
    /// thread.
    ///
    /// Returns `true` if a run was started.
    pub fn start_update(&self, download_url: &str, observer: Arc<dyn DownloadObserver>) -> bool {
        let url = match Url::parse(download_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => url,
            _ => {
                let message = format!("Invalid update URL: {}", download_url);
                error!("{}", message);
                observer.on_error(&message);
                return false;
            }
        };

        let cancel = {
            let mut shared = self.shared.lock();
            if shared.running {
                warn!("Update already in progress");
                observer.on_error("Update already in progress");
                return false;
            }
            shared.running = true;
            shared.cancel = CancellationToken::new();
            shared.status = UpdateStatus {
                stage: UpdateStage::Downloading,
                progress: 0.0,
                message: DOWNLOADING_MESSAGE.to_string(),
            };
            shared.cancel.clone()
        };

        let worker = UpdateWorker {
            url,
            updates_dir: self.updates_dir.clone(),
            site_packages: self.site_packages.clone(),
            network: Arc::clone(&self.network),
            installer: Arc::clone(&self.installer),
            shared: Arc::clone(&self.shared),
        };

        let spawned = thread::Builder::new()
            .name("sbcman-update".to_string())
            .spawn({
                let observer = Arc::clone(&observer);
                move || worker.run(observer.as_ref(), &cancel)
            });

        match spawned {
            Ok(handle) => {
                *self.worker.lock() = Some(handle);
                true
            }
            Err(e) => {
                let mut shared = self.shared.lock();
                shared.running = false;
                shared.status.stage = UpdateStage::Failed;
                let message = format!("Failed to start update thread: {}", e);
                error!("{}", message);
                observer.on_error(&message);
                false
            }
        }
    }

    /// Request cooperative cancellation of the running update.
    pub fn cancel(&self) {
        let shared = self.shared.lock();
        if shared.running {
            info!("Update cancellation requested");
            shared.cancel.cancel();
        }
    }

    /// Snapshot of the current status.
    pub fn status(&self) -> UpdateStatus {
        self.shared.lock().status.clone()
    }

    /// Whether an update is running.
    pub fn is_running(&self) -> bool {
        self.shared.lock().running
    }

    /// Wait for the most recent worker to exit.
    pub fn join(&self) -> bool {
        let handle = self.worker.lock().take();
        match handle {
            Some(handle) => {
                if handle.join().is_err() {
                    error!("Update worker panicked");
                }
                true
            }
            None => false,
        }
    }

    /// Remove downloaded update files. A missing directory is fine.
    pub fn cleanup(&self) -> ManagerResult<()> {
        match fs::remove_dir_all(&self.updates_dir) {
            Ok(()) => {
                info!(dir = %self.updates_dir.display(), "Cleaned up update files");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!(dir = %self.updates_dir.display(), error = %e, "Failed to clean up update files");
                Err(ManagerError::io(&self.updates_dir, e))
            }
        }
    }
}

struct UpdateWorker {
    url: Url,
    updates_dir: PathBuf,
    site_packages: Vec<PathBuf>,
    network: Arc<dyn NetworkClient>,
    installer: Arc<PackageInstaller>,
    shared: Arc<Mutex<Shared>>,
}

impl UpdateWorker {
    fn run(&self, observer: &dyn DownloadObserver, cancel: &CancellationToken) {
        let _guard = RunningGuard(&self.shared);

        match self.execute(observer, cancel) {
            Ok(message) => {
                info!(message = %message, "Update installed");
                self.set_status(UpdateStage::Complete, 1.0, &message);
                observer.on_overall_progress(1.0);
                observer.on_complete(true, &message);
            }
            Err(message) => {
                error!(error = %message, "Update failed");
                let progress = self.shared.lock().status.progress;
                self.set_status(UpdateStage::Failed, progress, &message);
                observer.on_error(&message);
                observer.on_complete(false, &message);
            }
        }
    }

    fn execute(
        &self,
        observer: &dyn DownloadObserver,
        cancel: &CancellationToken,
    ) -> Result<String, String> {
        let mut staged = StagedProgress::new();
        let dest = self.updates_dir.join(wheel_file_name(&self.url));

        info!(url = %self.url, dest = %dest.display(), "Downloading update");

        let downloaded = self.network.download(
            self.url.as_str(),
            &dest,
            &mut |done, total| {
                observer.on_progress(done, total);
                if let Some(global) = staged.advance(ProgressEvent::download(done, total)) {
                    self.set_status(UpdateStage::Downloading, global, DOWNLOADING_MESSAGE);
                    observer.on_overall_progress(global);
                }
            },
            cancel,
        );

        if cancel.is_cancelled() {
            fs::remove_file(&dest).ok();
            return Err("Update cancelled".to_string());
        }
        if !downloaded {
            return Err("Failed to download update".to_string());
        }
        match fs::metadata(&dest) {
            Ok(meta) if meta.len() > 0 => {}
            _ => return Err("Downloaded file is empty or missing".to_string()),
        }

        staged.advance(ProgressEvent::install(0, 1));
        self.set_status(UpdateStage::Installing, staged.value(), INSTALLING_MESSAGE);
        info!(wheel = %dest.display(), "Installing update");

        let request = InstallRequest::new(
            &dest,
            InstallTarget::site_packages(self.site_packages.clone()),
        );
        let result = self.installer.install_with(
            &request,
            &mut |done, total| {
                if let Some(global) = staged.advance(ProgressEvent::install(done, total)) {
                    self.set_status(UpdateStage::Installing, global, INSTALLING_MESSAGE);
                    observer.on_overall_progress(global);
                }
            },
            cancel,
        );

        if result.success {
            Ok(result.message)
        } else {
            Err(result.message)
        }
    }

    fn set_status(&self, stage: UpdateStage, progress: f64, message: &str) {
        let mut shared = self.shared.lock();
        shared.status = UpdateStatus {
            stage,
            progress,
            message: message.to_string(),
        };
    }
}

/// Last path segment of the download URL.
fn wheel_file_name(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "update.whl".to_string())
}
