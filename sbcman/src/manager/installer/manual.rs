//! Manual extraction strategy: validated extraction into a probed base dir.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::strategy::{InstallOutcome, InstallRequest, InstallStrategy};
use super::trusted::{run_with_timeout, PROBE_TIMEOUT};
use crate::manager::config::ExtractionLimits;
use crate::manager::error::{ManagerError, ManagerResult};
use crate::manager::extractor::{ArchiveExtractor, MemberProgress};

const NAME: &str = "manual extraction";

/// Check whether the current process may write into `path`.
#[cfg(unix)]
pub fn is_writable(path: &Path) -> bool {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: c_path is a valid NUL-terminated string that outlives the call.
    unsafe { libc::access(c_path.as_ptr(), libc::W_OK) == 0 }
}

#[cfg(not(unix))]
pub fn is_writable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| !m.permissions().readonly())
        .unwrap_or(false)
}

/// Ask the system Python where its site-packages directory is.
fn python_site_packages() -> Option<PathBuf> {
    let mut command = Command::new("python3");
    command.args(["-c", "import site; print(site.getsitepackages()[0])"]);
    site_packages_from(command, PROBE_TIMEOUT)
}

/// Run a site-packages query, giving up once `timeout` elapses.
fn site_packages_from(command: Command, timeout: Duration) -> Option<PathBuf> {
    let output = match run_with_timeout(command, timeout) {
        Ok(output) => output,
        Err(e) => {
            debug!(error = ?e, "site-packages query failed");
            return None;
        }
    };

    if !output.status.success() {
        debug!(
            status = %output.status,
            stderr = %output.stderr.trim(),
            "site-packages query failed"
        );
        return None;
    }

    let path = output.stdout.trim();
    (!path.is_empty()).then(|| PathBuf::from(path))
}

/// Extracts the artifact with [`ArchiveExtractor`] into the first usable
/// candidate base directory.
#[derive(Debug, Clone, Default)]
pub struct ManualExtraction {
    extractor: ArchiveExtractor,
    python_fallback: bool,
}

impl ManualExtraction {
    /// Create the strategy with the given extraction limits.
    pub fn new(limits: ExtractionLimits) -> Self {
        Self {
            extractor: ArchiveExtractor::new(limits),
            python_fallback: false,
        }
    }

    /// Ask `python3` for its site-packages directory when no configured
    /// candidate exists for a site-packages target.
    pub fn with_python_fallback(mut self, enabled: bool) -> Self {
        self.python_fallback = enabled;
        self
    }

    /// Choose the base directory for `request`.
    ///
    /// The first existing writable candidate wins. Failing that, site-packages
    /// targets may consult Python, and finally the first candidate that can be
    /// created is used.
    pub fn choose_base(&self, request: &InstallRequest) -> ManagerResult<PathBuf> {
        let candidates = request.target.candidates();

        if let Some(found) = candidates
            .iter()
            .find(|dir| dir.is_dir() && is_writable(dir))
        {
            debug!(base = %found.display(), "Using existing install base");
            return Ok(found.clone());
        }

        if self.python_fallback && request.target.is_site_packages() {
            if let Some(dir) = python_site_packages().filter(|d| d.is_dir() && is_writable(d)) {
                info!(base = %dir.display(), "Using Python site-packages");
                return Ok(dir);
            }
        }

        for dir in candidates {
            match fs::create_dir_all(dir) {
                Ok(()) if is_writable(dir) => {
                    info!(base = %dir.display(), "Created install base");
                    return Ok(dir.clone());
                }
                Ok(()) => debug!(base = %dir.display(), "Created base is not writable"),
                Err(e) => debug!(base = %dir.display(), error = %e, "Cannot create install base"),
            }
        }

        let tried = candidates
            .iter()
            .map(|d| d.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        warn!(candidates = %tried, "No writable install destination");
        Err(ManagerError::NoWritableDestination(tried))
    }
}

impl InstallStrategy for ManualExtraction {
    fn name(&self) -> &'static str {
        NAME
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
        request.validate()?;
        let base_dir = self.choose_base(request)?;
        let install_path = request.target.install_dir(&base_dir)?;

        let report = self
            .extractor
            .extract_with(&request.artifact, &install_path, on_member, cancel)?;

        let mut message = format!(
            "Extracted {} files to {}",
            report.files_written,
            install_path.display()
        );
        if !report.rejected.is_empty() {
            message.push_str(&format!(" ({} unsafe members skipped)", report.rejected.len()));
        }

        Ok(InstallOutcome {
            install_path,
            base_dir,
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::extractor::test_archives::write_zip;
    use crate::manager::installer::InstallTarget;
    use tempfile::TempDir;

    #[cfg(unix)]
    #[test]
    fn test_site_packages_query_reads_stdout() {
        let mut command = Command::new("sh");
        command.args(["-c", "echo /opt/python/site-packages"]);

        assert_eq!(
            site_packages_from(command, PROBE_TIMEOUT),
            Some(PathBuf::from("/opt/python/site-packages"))
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_hung_site_packages_query_gives_up() {
        let mut command = Command::new("sh");
        command.args(["-c", "exec sleep 30"]);
        let start = std::time::Instant::now();

        assert_eq!(site_packages_from(command, Duration::from_millis(300)), None);
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_prefers_first_existing_candidate() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("missing");
        let existing = temp.path().join("existing");
        fs::create_dir_all(&existing).unwrap();
        let request = InstallRequest::new(
            "pong.zip",
            InstallTarget::game("pong", vec![missing.clone(), existing.clone()]),
        );

        let base = ManualExtraction::default().choose_base(&request).unwrap();

        assert_eq!(base, existing);
        assert!(!missing.exists());
    }

    #[test]
    fn test_creates_first_candidate_when_none_exist() {
        let temp = TempDir::new().unwrap();
        let first = temp.path().join("a/b");
        let second = temp.path().join("c");
        let request = InstallRequest::new(
            "pong.zip",
            InstallTarget::game("pong", vec![first.clone(), second]),
        );

        let base = ManualExtraction::default().choose_base(&request).unwrap();

        assert_eq!(base, first);
        assert!(first.is_dir());
    }

    #[test]
    fn test_no_candidates_is_error() {
        let request = InstallRequest::new("pong.zip", InstallTarget::game("pong", Vec::new()));
        let result = ManualExtraction::default().choose_base(&request);
        assert!(matches!(result, Err(ManagerError::NoWritableDestination(_))));
    }

    #[test]
    fn test_extracts_game_under_id() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("pong.zip");
        write_zip(&archive, &[("main.py", b"print('pong')")]);
        let games = temp.path().join("games");
        let request =
            InstallRequest::new(&archive, InstallTarget::game("pong", vec![games.clone()]));

        let outcome = ManualExtraction::default()
            .install(&request, &mut |_, _| {}, &CancellationToken::new())
            .unwrap();

        assert_eq!(outcome.install_path, games.join("pong"));
        assert_eq!(outcome.base_dir, games);
        assert!(outcome.message.starts_with("Extracted 1 files"));
        assert_eq!(
            fs::read(games.join("pong/main.py")).unwrap(),
            b"print('pong')"
        );
    }

    #[test]
    fn test_install_path_rooted_under_base() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("root");
        let games = root.join("games");
        let archive = temp.path().join("pong.zip");
        write_zip(&archive, &[("main.py", b"print('pong')")]);
        let absolute = temp.path().join("abs_target");

        for id in ["../../escaped", absolute.to_str().unwrap(), "pong/../.."] {
            let request =
                InstallRequest::new(&archive, InstallTarget::game(id, vec![games.clone()]));

            let result = ManualExtraction::default().install(
                &request,
                &mut |_, _| {},
                &CancellationToken::new(),
            );

            assert!(
                matches!(result, Err(ManagerError::InvalidItemId { .. })),
                "id {:?} was accepted",
                id
            );
        }

        assert!(!temp.path().join("escaped").exists());
        assert!(!absolute.exists());
        assert!(!games.exists());
    }

    #[test]
    fn test_wheel_extracts_into_site_packages() {
        let temp = TempDir::new().unwrap();
        let wheel = temp.path().join("sbcman-1.2.0-py3-none-any.whl");
        write_zip(
            &wheel,
            &[
                ("sbcman/__init__.py", b""),
                ("sbcman-1.2.0.dist-info/METADATA", b"Name: sbcman"),
            ],
        );
        let site = temp.path().join("site-packages");
        let request = InstallRequest::new(&wheel, InstallTarget::site_packages(vec![site.clone()]));

        let outcome = ManualExtraction::default()
            .install(&request, &mut |_, _| {}, &CancellationToken::new())
            .unwrap();

        assert_eq!(outcome.install_path, site);
        assert!(site.join("sbcman/__init__.py").exists());
        assert!(site.join("sbcman-1.2.0.dist-info/METADATA").exists());
    }
}
