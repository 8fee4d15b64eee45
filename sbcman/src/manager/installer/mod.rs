//! Fallback-aware package installation.
//!
//! The installer walks an ordered chain of [`InstallStrategy`]s:
//! 1. [`TrustedInstaller`] (only when enabled, only for `.whl`)
//! 2. [`ManualExtraction`] into the first usable base directory
//!
//! A failing strategy logs and advances to the next one. On success the
//! entry point is made executable and the optional start script and icon
//! are copied to their destinations. Expected failures never escape as
//! errors; they fold into [`InstallationResult::success`] being `false`.

mod manual;
mod strategy;
mod trusted;

use std::fs;
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::config::ManagerConfig;
use super::error::ManagerError;
use super::extractor::MemberProgress;

pub use manual::{is_writable, ManualExtraction};
pub use strategy::{
    check_item_id, InstallOutcome, InstallRequest, InstallStrategy, InstallTarget,
};
pub use trusted::{parse_pip_version, PipCommand, TrustedInstaller};

/// Result of an installation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationResult {
    /// Whether any strategy succeeded.
    pub success: bool,
    /// Human-readable summary or failure reason.
    pub message: String,
    /// Where the content was installed (set on success).
    pub install_path: Option<PathBuf>,
}

impl InstallationResult {
    fn success(message: impl Into<String>, install_path: PathBuf) -> Self {
        Self {
            success: true,
            message: message.into(),
            install_path: Some(install_path),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            install_path: None,
        }
    }
}

/// Installs downloaded artifacts through an ordered strategy chain.
pub struct PackageInstaller {
    strategies: Vec<Box<dyn InstallStrategy>>,
    image_dir: Option<PathBuf>,
}

impl std::fmt::Debug for PackageInstaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.strategies.iter().map(|s| s.name()).collect();
        f.debug_struct("PackageInstaller")
            .field("strategies", &names)
            .field("image_dir", &self.image_dir)
            .finish()
    }
}

impl PackageInstaller {
    /// Build the standard chain from configuration.
    pub fn new(config: &ManagerConfig) -> Self {
        let mut strategies: Vec<Box<dyn InstallStrategy>> = Vec::new();

        if config.use_trusted_installer {
            strategies.push(Box::new(
                TrustedInstaller::new(config.site_packages_dirs.clone())
                    .with_timeout(config.installer_timeout),
            ));
        }
        strategies.push(Box::new(
            ManualExtraction::new(config.limits).with_python_fallback(true),
        ));

        Self {
            strategies,
            image_dir: config.image_dir.clone(),
        }
    }

    /// Build an installer from an explicit strategy chain.
    pub fn with_strategies(strategies: Vec<Box<dyn InstallStrategy>>) -> Self {
        Self {
            strategies,
            image_dir: None,
        }
    }

    /// Set the directory icons are copied into.
    pub fn with_image_dir(mut self, image_dir: Option<PathBuf>) -> Self {
        self.image_dir = image_dir;
        self
    }

    /// Names of the strategies in the order they are tried.
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Install without progress reporting or cancellation.
    pub fn install(&self, request: &InstallRequest) -> InstallationResult {
        self.install_with(request, &mut |_, _| {}, &CancellationToken::new())
    }

    /// Install, reporting per-member progress of extraction strategies.
    pub fn install_with(
        &self,
        request: &InstallRequest,
        on_member: MemberProgress<'_>,
        cancel: &CancellationToken,
    ) -> InstallationResult {
        if !request.artifact.is_file() {
            let message = format!("Package file not found: {}", request.artifact.display());
            error!("{}", message);
            return InstallationResult::failure(message);
        }

        if let Err(e) = request.validate() {
            let message = format!("Installation refused: {}", e);
            error!("{}", message);
            return InstallationResult::failure(message);
        }

        info!(artifact = %request.artifact.display(), "Installing package");

        let mut last_error: Option<ManagerError> = None;

        for strategy in self.strategies.iter().filter(|s| s.applies_to(request)) {
            match strategy.install(request, &mut *on_member, cancel) {
                Ok(outcome) => {
                    info!(
                        strategy = strategy.name(),
                        path = %outcome.install_path.display(),
                        "Installation succeeded"
                    );
                    self.finish(request, &outcome);
                    return InstallationResult::success(outcome.message, outcome.install_path);
                }
                Err(ManagerError::Cancelled) => {
                    info!("Installation cancelled");
                    return InstallationResult::failure("Installation cancelled");
                }
                Err(e) => {
                    warn!(strategy = strategy.name(), error = %e, "Install strategy failed");
                    last_error = Some(e);
                }
            }
        }

        let message = match last_error {
            Some(e) => format!("Installation failed: {}", e),
            None => format!(
                "No install strategy applies to {}",
                request.artifact.display()
            ),
        };
        error!("{}", message);
        InstallationResult::failure(message)
    }

    /// Post-install steps. Failures are logged, never fatal.
    fn finish(&self, request: &InstallRequest, outcome: &InstallOutcome) {
        if let Some(entry_point) = &request.entry_point {
            let path = outcome.install_path.join(entry_point);
            if path.is_file() {
                make_executable(&path);
            }
        }

        if let Some(script) = &request.start_script {
            copy_post_install(
                &outcome.install_path.join(script),
                &outcome.base_dir.join(script),
            );
        }

        if let Some(icon) = &request.icon {
            match &self.image_dir {
                Some(image_dir) => {
                    copy_post_install(&outcome.install_path.join(icon), &image_dir.join(icon))
                }
                None => warn!("Image directory not configured, skipping icon copy"),
            }
        }
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    match fs::set_permissions(path, fs::Permissions::from_mode(0o755)) {
        Ok(()) => info!(path = %path.display(), "Made entry point executable"),
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to chmod entry point"),
    }
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) {}

fn copy_post_install(source: &Path, dest: &Path) {
    if !source.is_file() {
        warn!(source = %source.display(), "Post-install file not found");
        return;
    }

    let result = dest
        .parent()
        .map_or(Ok(()), fs::create_dir_all)
        .and_then(|()| fs::copy(source, dest));

    match result {
        Ok(_) => info!(dest = %dest.display(), "Copied post-install file"),
        Err(e) => error!(
            source = %source.display(),
            dest = %dest.display(),
            error = %e,
            "Failed to copy post-install file"
        ),
    }
}
