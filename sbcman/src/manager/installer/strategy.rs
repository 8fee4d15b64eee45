//! Install requests and the strategy seam.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use crate::manager::error::{ManagerError, ManagerResult};
use crate::manager::extractor::{check_path, MemberProgress};

/// Check that `id` names exactly one directory below an install base.
pub fn check_item_id(id: &str) -> ManagerResult<()> {
    let invalid = |reason: String| ManagerError::InvalidItemId {
        id: id.to_string(),
        reason,
    };

    check_path(id).map_err(|reason| invalid(reason.to_string()))?;
    if id.contains(['/', '\\']) || id.trim_matches('.').is_empty() {
        return Err(invalid("must be a single directory name".to_string()));
    }
    Ok(())
}

/// Check that a relative request path stays inside the directory it is
/// joined to.
fn check_relative(path: &str) -> ManagerResult<()> {
    check_path(path).map_err(|reason| ManagerError::UnsafePath {
        path: path.to_string(),
        reason,
    })
}

/// Where an artifact should end up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallTarget {
    /// A game bundle, installed under `<base>/<id>`.
    Game {
        /// Item identifier, used as the install subdirectory.
        id: String,
        /// Candidate base directories in probe order.
        candidates: Vec<PathBuf>,
    },
    /// A self-update wheel, extracted directly into site-packages.
    SitePackages {
        /// Candidate site-packages directories in probe order.
        candidates: Vec<PathBuf>,
    },
}

impl InstallTarget {
    /// Target a game install under one of `candidates`.
    pub fn game(id: impl Into<String>, candidates: Vec<PathBuf>) -> Self {
        Self::Game {
            id: id.into(),
            candidates,
        }
    }

    /// Target a site-packages install.
    pub fn site_packages(candidates: Vec<PathBuf>) -> Self {
        Self::SitePackages { candidates }
    }

    /// Candidate base directories in probe order.
    pub fn candidates(&self) -> &[PathBuf] {
        match self {
            Self::Game { candidates, .. } | Self::SitePackages { candidates } => candidates,
        }
    }

    /// Reject a game id that would not resolve to a child of the base.
    pub fn validate(&self) -> ManagerResult<()> {
        match self {
            Self::Game { id, .. } => check_item_id(id),
            Self::SitePackages { .. } => Ok(()),
        }
    }

    /// Install directory for a chosen base. Always rooted under `base`.
    pub fn install_dir(&self, base: &Path) -> ManagerResult<PathBuf> {
        self.validate()?;
        Ok(match self {
            Self::Game { id, .. } => base.join(id),
            Self::SitePackages { .. } => base.to_path_buf(),
        })
    }

    /// Whether this targets site-packages.
    pub fn is_site_packages(&self) -> bool {
        matches!(self, Self::SitePackages { .. })
    }
}

/// One installation job.
#[derive(Debug, Clone)]
pub struct InstallRequest {
    /// Downloaded artifact on disk.
    pub artifact: PathBuf,
    /// Destination.
    pub target: InstallTarget,
    /// Entry point relative to the install directory.
    pub entry_point: Option<String>,
    /// Launcher script copied into the base directory after install.
    pub start_script: Option<String>,
    /// Icon copied into the image directory after install.
    pub icon: Option<String>,
}

impl InstallRequest {
    /// Create a request with no entry point or post-install files.
    pub fn new(artifact: impl Into<PathBuf>, target: InstallTarget) -> Self {
        Self {
            artifact: artifact.into(),
            target,
            entry_point: None,
            start_script: None,
            icon: None,
        }
    }

    /// Set the entry point.
    pub fn with_entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = Some(entry_point.into());
        self
    }

    /// Set the start script.
    pub fn with_start_script(mut self, script: impl Into<String>) -> Self {
        self.start_script = Some(script.into());
        self
    }

    /// Set the icon.
    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    /// Check the target and every post-install path before anything is
    /// written.
    pub fn validate(&self) -> ManagerResult<()> {
        self.target.validate()?;
        [&self.entry_point, &self.start_script, &self.icon]
            .into_iter()
            .flatten()
            .try_for_each(|path| check_relative(path))
    }

    /// Whether the artifact is a Python wheel.
    pub fn is_wheel(&self) -> bool {
        self.artifact
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("whl"))
            .unwrap_or(false)
    }
}

/// What a successful strategy produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    /// Directory holding the installed content.
    pub install_path: PathBuf,
    /// Base directory the install path was chosen under.
    pub base_dir: PathBuf,
    /// Human-readable summary.
    pub message: String,
}

/// One way of installing an artifact.
///
/// The installer tries strategies in order; an `Err` advances to the next
/// applicable strategy, except [`ManagerError::Cancelled`] which stops the
/// chain.
///
/// [`ManagerError::Cancelled`]: crate::manager::ManagerError::Cancelled
pub trait InstallStrategy: Send + Sync {
    /// Short name used in logs and error messages.
    fn name(&self) -> &'static str;

    /// Whether this strategy should be attempted for `request`.
    fn applies_to(&self, request: &InstallRequest) -> bool;

    /// Attempt the installation.
    fn install(
        &self,
        request: &InstallRequest,
        on_member: MemberProgress<'_>,
        cancel: &CancellationToken,
    ) -> ManagerResult<InstallOutcome>;
}
