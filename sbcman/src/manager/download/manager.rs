//! Background download-and-install of catalog items.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::observer::DownloadObserver;
use super::progress::{ProgressEvent, StagedProgress};
use super::state::{AtomicTaskState, TaskState};
use crate::manager::config::ManagerConfig;
use crate::manager::installer::{
    check_item_id, InstallRequest, InstallTarget, PackageInstaller,
};
use crate::manager::traits::NetworkClient;
use crate::package::{GameCatalog, PackageMetadata};

/// Catalog shared between the caller and the worker thread.
pub type SharedCatalog = Arc<Mutex<dyn GameCatalog>>;

/// Wrap `catalog` for sharing with a [`DownloadManager`].
pub fn shared_catalog<C: GameCatalog + 'static>(catalog: C) -> SharedCatalog {
    Arc::new(Mutex::new(catalog))
}

/// Observer used when the caller passes none.
struct SilentObserver;

impl DownloadObserver for SilentObserver {
    fn on_progress(&self, _downloaded: u64, _total: u64) {}
    fn on_complete(&self, _success: bool, _message: &str) {}
    fn on_error(&self, _message: &str) {}
}

/// State shared between the manager and its worker.
#[derive(Debug, Default)]
struct RunStatus {
    state: AtomicTaskState,
    progress: Mutex<f64>,
    cancel: Mutex<CancellationToken>,
}

/// Leaves `Running` and resets progress however the worker exits.
struct RunGuard<'a> {
    status: &'a RunStatus,
    terminal: TaskState,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        *self.status.progress.lock() = 0.0;
        self.status.state.finish(self.terminal);
    }
}

/// Why a run did not complete.
enum RunFailure {
    Cancelled,
    Failed(String),
}

/// Downloads an item, installs it and records it in the catalog.
///
/// Single-flight: at most one run is active; a second request while one is
/// running is refused with an error notification.
pub struct DownloadManager {
    config: Arc<ManagerConfig>,
    network: Arc<dyn NetworkClient>,
    installer: Arc<PackageInstaller>,
    catalog: Option<SharedCatalog>,
    status: Arc<RunStatus>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DownloadManager {
    /// Create a manager using the standard installer chain for `config`.
    pub fn new(config: ManagerConfig, network: Arc<dyn NetworkClient>) -> Self {
        let installer = PackageInstaller::new(&config);
        Self {
            config: Arc::new(config),
            network,
            installer: Arc::new(installer),
            catalog: None,
            status: Arc::new(RunStatus::default()),
            worker: Mutex::new(None),
        }
    }

    /// Record installed items in `catalog`.
    pub fn with_catalog(mut self, catalog: SharedCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Replace the installer.
    pub fn with_installer(mut self, installer: PackageInstaller) -> Self {
        self.installer = Arc::new(installer);
        self
    }

    /// Start downloading and installing `item` on a background thread.
    ///
    /// Returns `true` if a run was started. Refusals are reported through
    /// `on_error` only, with no completion notification.
    pub fn download(
        &self,
        item: PackageMetadata,
        observer: Option<Arc<dyn DownloadObserver>>,
    ) -> bool {
        let observer: Arc<dyn DownloadObserver> = match observer {
            Some(observer) => observer,
            None => Arc::new(SilentObserver),
        };

        if self.status.state.load() == TaskState::Running {
            warn!("Download already in progress");
            observer.on_error("Download already in progress");
            return false;
        }

        if item.download_url.trim().is_empty() {
            error!(item = %item.name, "No download URL");
            observer.on_error("No download URL available");
            return false;
        }

        if let Err(e) = check_item_id(&item.id) {
            error!(item = %item.name, error = %e, "Refusing to install item");
            observer.on_error(&format!("Cannot install {}: {}", item.name, e));
            return false;
        }

        if !self.status.state.try_start() {
            warn!("Download already in progress");
            observer.on_error("Download already in progress");
            return false;
        }

        let cancel = CancellationToken::new();
        *self.status.cancel.lock() = cancel.clone();
        *self.status.progress.lock() = 0.0;

        let worker = Worker {
            config: Arc::clone(&self.config),
            network: Arc::clone(&self.network),
            installer: Arc::clone(&self.installer),
            catalog: self.catalog.clone(),
            status: Arc::clone(&self.status),
        };
        let name = item.name.clone();

        let spawned = thread::Builder::new()
            .name("sbcman-download".to_string())
            .spawn({
                let observer = Arc::clone(&observer);
                move || worker.run(item, observer.as_ref(), &cancel)
            });

        match spawned {
            Ok(handle) => {
                // A finished previous worker is simply detached.
                *self.worker.lock() = Some(handle);
                info!(item = %name, "Started download");
                true
            }
            Err(e) => {
                self.status.state.finish(TaskState::Failed);
                let message = format!("Failed to start download thread: {}", e);
                error!("{}", message);
                observer.on_error(&message);
                false
            }
        }
    }

    /// Request cooperative cancellation of the active run.
    pub fn cancel(&self) {
        if self.is_running() {
            info!("Download cancellation requested");
            self.status.cancel.lock().cancel();
        }
    }

    /// Global progress of the active run, `[0, 1]`. Zero when idle.
    pub fn progress(&self) -> f64 {
        *self.status.progress.lock()
    }

    /// Current task state.
    pub fn state(&self) -> TaskState {
        self.status.state.load()
    }

    /// Whether a run is active.
    pub fn is_running(&self) -> bool {
        self.state() == TaskState::Running
    }

    /// Wait for the most recent worker to exit.
    ///
    /// Returns `false` if there was no worker to wait for.
    pub fn join(&self) -> bool {
        let handle = self.worker.lock().take();
        match handle {
            Some(handle) => {
                if handle.join().is_err() {
                    error!("Download worker panicked");
                }
                true
            }
            None => false,
        }
    }
}

/// Everything a run needs, owned by the worker thread.
struct Worker {
    config: Arc<ManagerConfig>,
    network: Arc<dyn NetworkClient>,
    installer: Arc<PackageInstaller>,
    catalog: Option<SharedCatalog>,
    status: Arc<RunStatus>,
}

impl Worker {
    fn run(
        &self,
        mut item: PackageMetadata,
        observer: &dyn DownloadObserver,
        cancel: &CancellationToken,
    ) {
        let mut guard = RunGuard {
            status: &self.status,
            terminal: TaskState::Failed,
        };

        match self.execute(&mut item, observer, cancel) {
            Ok(message) => {
                info!(item = %item.name, "Download and installation complete");
                guard.terminal = TaskState::Complete;
                observer.on_complete(true, &message);
            }
            Err(RunFailure::Cancelled) => {
                let message = "Download cancelled";
                info!(item = %item.name, "{}", message);
                guard.terminal = TaskState::Cancelled;
                observer.on_error(message);
                observer.on_complete(false, message);
            }
            Err(RunFailure::Failed(message)) => {
                error!(item = %item.name, error = %message, "Download failed");
                observer.on_error(&message);
                observer.on_complete(false, &message);
            }
        }
    }

    fn execute(
        &self,
        item: &mut PackageMetadata,
        observer: &dyn DownloadObserver,
        cancel: &CancellationToken,
    ) -> Result<String, RunFailure> {
        let mut staged = StagedProgress::new();
        let dest = self.config.downloads_dir.join(item.artifact_name());

        info!(url = %item.download_url, dest = %dest.display(), "Downloading");

        let downloaded = self.network.download(
            &item.download_url,
            &dest,
            &mut |done, total| {
                observer.on_progress(done, total);
                self.report(&mut staged, ProgressEvent::download(done, total), observer);
            },
            cancel,
        );

        if cancel.is_cancelled() {
            fs::remove_file(&dest).ok();
            return Err(RunFailure::Cancelled);
        }
        if !downloaded {
            return Err(RunFailure::Failed("Download failed".to_string()));
        }

        let request = self.install_request(item, dest.clone());
        let result = self.installer.install_with(
            &request,
            &mut |done, total| {
                self.report(&mut staged, ProgressEvent::install(done, total), observer);
            },
            cancel,
        );

        // A finished install stands even if cancel arrived late.
        let install_path = match (result.success, result.install_path) {
            (true, Some(path)) => path,
            _ if cancel.is_cancelled() => return Err(RunFailure::Cancelled),
            _ => return Err(RunFailure::Failed(result.message)),
        };

        item.mark_installed(install_path);
        self.persist(item);

        if let Err(e) = fs::remove_file(&dest) {
            warn!(path = %dest.display(), error = %e, "Failed to remove downloaded file");
        }

        *self.status.progress.lock() = staged.complete();
        observer.on_overall_progress(1.0);

        Ok(format!("Successfully installed {}", item.name))
    }

    fn report(
        &self,
        staged: &mut StagedProgress,
        event: ProgressEvent,
        observer: &dyn DownloadObserver,
    ) {
        if let Some(global) = staged.advance(event) {
            *self.status.progress.lock() = global;
            observer.on_overall_progress(global);
        }
    }

    fn install_request(&self, item: &PackageMetadata, artifact: PathBuf) -> InstallRequest {
        let target = InstallTarget::game(item.id.clone(), self.config.game_base_candidates());
        let mut request = InstallRequest::new(artifact, target);

        if !item.entry_point.is_empty() {
            request = request.with_entry_point(item.entry_point.clone());
        }
        if let Some(script) = &item.start_script {
            request = request.with_start_script(script.clone());
        }
        if let Some(icon) = &item.icon {
            request = request.with_icon(icon.clone());
        }
        request
    }

    /// Add-or-update the item and save. Failures are logged only.
    fn persist(&self, item: &PackageMetadata) {
        let Some(catalog) = &self.catalog else {
            warn!(item = %item.name, "No catalog configured, installed item will not be persisted");
            return;
        };

        let mut catalog = catalog.lock();
        let result = catalog.upsert(item.clone()).and_then(|()| catalog.save());

        match result {
            Ok(()) => info!(item = %item.name, "Recorded installed item in catalog"),
            Err(e) => error!(item = %item.name, error = %e, "Failed to persist item to catalog"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::download::{ChannelObserver, DownloadEvent};
    use crate::manager::error::ManagerResult;
    use crate::manager::extractor::test_archives::write_zip;
    use crate::manager::extractor::MemberProgress;
    use crate::manager::installer::{InstallOutcome, InstallStrategy, ManualExtraction};
    use crate::manager::traits::ProgressCallback;
    use crate::package::{CatalogError, CatalogResult, MemoryCatalog};
    use std::path::Path;
    use std::sync::mpsc::{self, Receiver};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Network fake that copies a prepared file and replays scripted ticks.
    struct ScriptedNetwork {
        source: Option<PathBuf>,
        ticks: Vec<(u64, u64)>,
        gate: Option<Mutex<Receiver<()>>>,
    }

    impl ScriptedNetwork {
        fn serving(source: PathBuf, ticks: Vec<(u64, u64)>) -> Self {
            Self {
                source: Some(source),
                ticks,
                gate: None,
            }
        }

        fn failing() -> Self {
            Self {
                source: None,
                ticks: Vec::new(),
                gate: None,
            }
        }
    }

    impl NetworkClient for ScriptedNetwork {
        fn download(
            &self,
            _url: &str,
            dest: &Path,
            on_progress: ProgressCallback<'_>,
            cancel: &CancellationToken,
        ) -> bool {
            if let Some(gate) = &self.gate {
                let gate = gate.lock();
                while gate.recv_timeout(Duration::from_millis(10)).is_err() {
                    if cancel.is_cancelled() {
                        return false;
                    }
                }
            }

            let Some(source) = &self.source else {
                return false;
            };
            for &(done, total) in &self.ticks {
                on_progress(done, total);
            }
            fs::create_dir_all(dest.parent().unwrap()).unwrap();
            fs::copy(source, dest).unwrap();
            true
        }

        fn check(&self, _url: &str) -> bool {
            true
        }

        fn size(&self, _url: &str) -> Option<u64> {
            None
        }

        fn fetch_text(&self, _url: &str) -> Option<String> {
            None
        }
    }

    /// Catalog whose save always fails.
    struct BrokenCatalog(MemoryCatalog);

    impl GameCatalog for BrokenCatalog {
        fn get(&self, id: &str) -> Option<&PackageMetadata> {
            self.0.get(id)
        }
        fn add(&mut self, item: PackageMetadata) {
            self.0.add(item)
        }
        fn update(&mut self, item: PackageMetadata) -> CatalogResult<()> {
            self.0.update(item)
        }
        fn save(&self) -> CatalogResult<()> {
            Err(CatalogError::NotFound("disk".to_string()))
        }
    }

    /// Extracts normally, then fires the run's cancel token.
    struct CancelAfterExtract(ManualExtraction);

    impl InstallStrategy for CancelAfterExtract {
        fn name(&self) -> &'static str {
            "cancel after extract"
        }

        fn applies_to(&self, _request: &InstallRequest) -> bool {
            true
        }

        fn install(
            &self,
            request: &InstallRequest,
            on_member: MemberProgress<'_>,
            cancel: &CancellationToken,
        ) -> ManagerResult<InstallOutcome> {
            let outcome = self.0.install(request, on_member, cancel)?;
            cancel.cancel();
            Ok(outcome)
        }
    }

    struct Fixture {
        temp: TempDir,
        config: ManagerConfig,
        bundle: PathBuf,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let bundle = temp.path().join("served/pong.zip");
        fs::create_dir_all(bundle.parent().unwrap()).unwrap();
        write_zip(
            &bundle,
            &[("pong/", b""), ("pong/main.py", b"print('pong')"), ("pong/data.txt", b"1")],
        );
        let config = ManagerConfig::new(temp.path().join("games"))
            .with_downloads_dir(temp.path().join("downloads"))
            .with_temp_dir(temp.path().join("tmp"));
        Fixture {
            temp,
            config,
            bundle,
        }
    }

    fn pong() -> PackageMetadata {
        PackageMetadata::new("pong", "Pong", "https://example.com/pong.zip")
            .with_entry_point("pong/main.py")
    }

    fn run_to_end(manager: &DownloadManager, item: PackageMetadata) -> Vec<DownloadEvent> {
        let (observer, events) = ChannelObserver::new();
        assert!(manager.download(item, Some(Arc::new(observer))));
        assert!(manager.join());
        events.try_iter().collect()
    }

    fn overall(events: &[DownloadEvent]) -> Vec<f64> {
        events
            .iter()
            .filter_map(|e| match e {
                DownloadEvent::Overall(f) => Some(*f),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_successful_run_installs_and_persists() {
        let fx = fixture();
        let catalog = Arc::new(Mutex::new(MemoryCatalog::new()));
        let network = ScriptedNetwork::serving(fx.bundle.clone(), vec![(500, 1000), (1000, 1000)]);
        let manager = DownloadManager::new(fx.config.clone(), Arc::new(network))
            .with_catalog(catalog.clone());

        let events = run_to_end(&manager, pong());

        let progress = overall(&events);
        assert_eq!(&progress[..2], &[0.3, 0.6]);
        assert_eq!(*progress.last().unwrap(), 1.0);
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(
            events.last().unwrap(),
            &DownloadEvent::Complete {
                success: true,
                message: "Successfully installed Pong".to_string()
            }
        );

        let install_dir = fx.temp.path().join("games/pong");
        assert!(install_dir.join("pong/main.py").exists());
        let stored = catalog.lock().get("pong").cloned().unwrap();
        assert!(stored.installed);
        assert_eq!(stored.install_path, Some(install_dir));
        assert!(!fx.temp.path().join("downloads/pong.zip").exists());
        assert_eq!(manager.state(), TaskState::Complete);
        assert_eq!(manager.progress(), 0.0);
    }

    #[test]
    fn test_alternate_base_dir_takes_precedence() {
        let fx = fixture();
        let alternate = fx.temp.path().join("ports");
        fs::create_dir_all(&alternate).unwrap();
        let config = fx.config.clone().with_alternate_base_dir(alternate.clone());
        let network = ScriptedNetwork::serving(fx.bundle.clone(), Vec::new());
        let manager = DownloadManager::new(config, Arc::new(network));

        run_to_end(&manager, pong());

        assert!(alternate.join("pong/pong/main.py").exists());
        assert!(!fx.temp.path().join("games/pong").exists());
    }

    #[test]
    fn test_missing_url_is_refused() {
        let fx = fixture();
        let manager = DownloadManager::new(fx.config, Arc::new(ScriptedNetwork::failing()));
        let (observer, events) = ChannelObserver::new();

        let started = manager.download(
            PackageMetadata::new("pong", "Pong", ""),
            Some(Arc::new(observer)),
        );

        assert!(!started);
        assert_eq!(
            events.try_iter().collect::<Vec<_>>(),
            vec![DownloadEvent::Error("No download URL available".to_string())]
        );
        assert_eq!(manager.state(), TaskState::Idle);
    }

    #[test]
    fn test_escaping_item_id_is_refused() {
        let fx = fixture();
        let network = ScriptedNetwork::serving(fx.bundle.clone(), Vec::new());
        let manager = DownloadManager::new(fx.config, Arc::new(network));

        for id in ["../../escaped", "/tmp/abs", "a/b", ""] {
            let (observer, events) = ChannelObserver::new();
            let item = PackageMetadata::new(id, "Pong", "https://example.com/pong.zip");

            assert!(!manager.download(item, Some(Arc::new(observer))));

            let events = events.try_iter().collect::<Vec<_>>();
            assert_eq!(events.len(), 1);
            assert!(matches!(
                &events[0],
                DownloadEvent::Error(m) if m.starts_with("Cannot install Pong: invalid item id")
            ));
        }

        assert_eq!(manager.state(), TaskState::Idle);
        assert!(!fx.temp.path().join("downloads").exists());
        assert!(!fx.temp.path().join("games").exists());
    }

    #[test]
    fn test_cancel_after_finished_install_keeps_install() {
        let fx = fixture();
        let catalog = shared_catalog(MemoryCatalog::new());
        let network = ScriptedNetwork::serving(fx.bundle.clone(), Vec::new());
        let manager = DownloadManager::new(fx.config, Arc::new(network))
            .with_installer(PackageInstaller::with_strategies(vec![Box::new(
                CancelAfterExtract(ManualExtraction::default()),
            )]))
            .with_catalog(catalog.clone());

        let events = run_to_end(&manager, pong());

        assert_eq!(
            events.last().unwrap(),
            &DownloadEvent::Complete {
                success: true,
                message: "Successfully installed Pong".to_string()
            }
        );
        assert!(!events.iter().any(|e| matches!(e, DownloadEvent::Error(_))));
        let stored = catalog.lock().get("pong").cloned().unwrap();
        assert!(stored.installed);
        assert!(fx.temp.path().join("games/pong/pong/main.py").exists());
        assert!(!fx.temp.path().join("downloads/pong.zip").exists());
        assert_eq!(manager.state(), TaskState::Complete);
    }

    #[test]
    fn test_network_failure_reports_error_then_completion() {
        let fx = fixture();
        let manager = DownloadManager::new(fx.config, Arc::new(ScriptedNetwork::failing()));

        let events = run_to_end(&manager, pong());

        assert_eq!(
            events,
            vec![
                DownloadEvent::Error("Download failed".to_string()),
                DownloadEvent::Complete {
                    success: false,
                    message: "Download failed".to_string()
                },
            ]
        );
        assert_eq!(manager.state(), TaskState::Failed);
        assert!(!manager.is_running());
    }

    #[test]
    fn test_install_failure_reports_error() {
        let fx = fixture();
        let bogus = fx.temp.path().join("served/pong.rar");
        fs::write(&bogus, b"Rar!").unwrap();
        let network = ScriptedNetwork::serving(bogus, Vec::new());
        let manager = DownloadManager::new(fx.config, Arc::new(network));
        let item = PackageMetadata::new("pong", "Pong", "https://example.com/pong.rar");

        let events = run_to_end(&manager, item);

        assert!(matches!(
            &events[events.len() - 2],
            DownloadEvent::Error(m) if m.contains("unsupported archive format")
        ));
        assert!(matches!(
            events.last().unwrap(),
            DownloadEvent::Complete { success: false, .. }
        ));
    }

    #[test]
    fn test_catalog_save_failure_is_not_fatal() {
        let fx = fixture();
        let catalog = Arc::new(Mutex::new(BrokenCatalog(MemoryCatalog::new())));
        let network = ScriptedNetwork::serving(fx.bundle.clone(), Vec::new());
        let manager =
            DownloadManager::new(fx.config, Arc::new(network)).with_catalog(catalog.clone());

        let events = run_to_end(&manager, pong());

        assert!(matches!(
            events.last().unwrap(),
            DownloadEvent::Complete { success: true, .. }
        ));
    }

    #[test]
    fn test_second_request_while_running_is_refused() {
        let fx = fixture();
        let (release, gate) = mpsc::channel();
        let network = ScriptedNetwork {
            gate: Some(Mutex::new(gate)),
            ..ScriptedNetwork::serving(fx.bundle.clone(), Vec::new())
        };
        let manager = DownloadManager::new(fx.config, Arc::new(network));

        let (first, first_events) = ChannelObserver::new();
        assert!(manager.download(pong(), Some(Arc::new(first))));
        assert!(manager.is_running());

        let (second, second_events) = ChannelObserver::new();
        assert!(!manager.download(pong(), Some(Arc::new(second))));
        assert_eq!(
            second_events.try_iter().collect::<Vec<_>>(),
            vec![DownloadEvent::Error("Download already in progress".to_string())]
        );

        release.send(()).unwrap();
        manager.join();
        assert!(first_events.try_iter().last().unwrap().is_complete());
        assert_eq!(manager.state(), TaskState::Complete);
    }

    #[test]
    fn test_cancel_stops_run() {
        let fx = fixture();
        let (_release, gate) = mpsc::channel::<()>();
        let network = ScriptedNetwork {
            gate: Some(Mutex::new(gate)),
            ..ScriptedNetwork::serving(fx.bundle.clone(), Vec::new())
        };
        let manager = DownloadManager::new(fx.config, Arc::new(network));
        let (observer, events) = ChannelObserver::new();

        assert!(manager.download(pong(), Some(Arc::new(observer))));
        manager.cancel();
        manager.join();

        assert_eq!(
            events.try_iter().collect::<Vec<_>>(),
            vec![
                DownloadEvent::Error("Download cancelled".to_string()),
                DownloadEvent::Complete {
                    success: false,
                    message: "Download cancelled".to_string()
                },
            ]
        );
        assert_eq!(manager.state(), TaskState::Cancelled);
        assert!(!fx.temp.path().join("games/pong").exists());
    }

    #[test]
    fn test_manager_is_reusable_after_completion() {
        let fx = fixture();
        let network = ScriptedNetwork::serving(fx.bundle.clone(), Vec::new());
        let manager = DownloadManager::new(fx.config, Arc::new(network));

        run_to_end(&manager, pong());
        let events = run_to_end(&manager, pong());

        assert!(matches!(
            events.last().unwrap(),
            DownloadEvent::Complete { success: true, .. }
        ));
    }
}
