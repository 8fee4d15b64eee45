//! Configuration for the acquisition and installation pipeline.

use std::path::PathBuf;
use std::time::Duration;

/// Default per-member size bound (100 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Default aggregate size bound (1 GiB).
pub const DEFAULT_MAX_TOTAL_SIZE: u64 = 1024 * 1024 * 1024;

/// Default uncompressed/compressed ratio bound.
pub const DEFAULT_MAX_COMPRESSION_RATIO: f64 = 100.0;

/// Default hard timeout for the trusted installer subprocess.
pub const DEFAULT_INSTALLER_TIMEOUT: Duration = Duration::from_secs(300);

/// Limits applied to every archive member before extraction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractionLimits {
    /// Largest accepted uncompressed member size in bytes.
    pub max_file_size: u64,
    /// Largest accepted sum of member sizes in bytes.
    pub max_total_size: u64,
    /// Largest accepted uncompressed/compressed ratio.
    pub max_compression_ratio: f64,
}

impl Default for ExtractionLimits {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_total_size: DEFAULT_MAX_TOTAL_SIZE,
            max_compression_ratio: DEFAULT_MAX_COMPRESSION_RATIO,
        }
    }
}

/// Configuration for the download manager, installer and update service.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Directory game bundles are installed under (`<games_dir>/<id>`).
    pub games_dir: PathBuf,

    /// Alternate base install directory that takes precedence over
    /// `games_dir` when it exists and is writable.
    pub alternate_base_dir: Option<PathBuf>,

    /// Directory for in-flight game downloads.
    pub downloads_dir: PathBuf,

    /// Directory for temporary files; self-updates land in `<temp_dir>/updates`.
    pub temp_dir: PathBuf,

    /// Candidate site-packages directories for self-update extraction.
    ///
    /// Probed in order; the first existing and writable one wins.
    pub site_packages_dirs: Vec<PathBuf>,

    /// Where a game's icon is copied after installation.
    pub image_dir: Option<PathBuf>,

    /// Whether `.whl` artifacts go through the trusted installer first.
    pub use_trusted_installer: bool,

    /// HTTP request timeout.
    pub timeout: Duration,

    /// Hard timeout for the trusted installer subprocess.
    pub installer_timeout: Duration,

    /// Archive validation limits.
    pub limits: ExtractionLimits,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        let temp_dir = std::env::temp_dir().join("sbcman");
        Self {
            games_dir: PathBuf::from("games"),
            alternate_base_dir: None,
            downloads_dir: temp_dir.join("downloads"),
            temp_dir,
            site_packages_dirs: Vec::new(),
            image_dir: None,
            use_trusted_installer: false,
            timeout: Duration::from_secs(30),
            installer_timeout: DEFAULT_INSTALLER_TIMEOUT,
            limits: ExtractionLimits::default(),
        }
    }
}

impl ManagerConfig {
    /// Create a new configuration with the given games directory.
    pub fn new(games_dir: PathBuf) -> Self {
        Self {
            games_dir,
            ..Default::default()
        }
    }

    /// Set the alternate base install directory.
    pub fn with_alternate_base_dir(mut self, path: PathBuf) -> Self {
        self.alternate_base_dir = Some(path);
        self
    }

    /// Set the downloads directory.
    pub fn with_downloads_dir(mut self, path: PathBuf) -> Self {
        self.downloads_dir = path;
        self
    }

    /// Set the temporary directory.
    pub fn with_temp_dir(mut self, path: PathBuf) -> Self {
        self.temp_dir = path;
        self
    }

    /// Add a candidate site-packages directory.
    pub fn with_site_packages_dir(mut self, path: PathBuf) -> Self {
        self.site_packages_dirs.push(path);
        self
    }

    /// Set the icon directory.
    pub fn with_image_dir(mut self, path: PathBuf) -> Self {
        self.image_dir = Some(path);
        self
    }

    /// Enable or disable the trusted installer.
    pub fn with_trusted_installer(mut self, enabled: bool) -> Self {
        self.use_trusted_installer = enabled;
        self
    }

    /// Set the HTTP timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the trusted installer timeout.
    pub fn with_installer_timeout(mut self, timeout: Duration) -> Self {
        self.installer_timeout = timeout;
        self
    }

    /// Set the archive validation limits.
    pub fn with_limits(mut self, limits: ExtractionLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Candidate base directories for game installs, in probe order.
    pub fn game_base_candidates(&self) -> Vec<PathBuf> {
        self.alternate_base_dir
            .iter()
            .cloned()
            .chain(std::iter::once(self.games_dir.clone()))
            .collect()
    }

    /// Directory holding downloaded self-update artifacts.
    pub fn updates_dir(&self) -> PathBuf {
        self.temp_dir.join("updates")
    }
}
