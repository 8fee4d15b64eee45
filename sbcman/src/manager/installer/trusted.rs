//! Trusted installer strategy: hand `.whl` artifacts to the system pip.
//!
//! The pip command is discovered by probing each candidate with
//! `--version`. Pip 23 and newer refuse to touch externally managed
//! environments unless `--break-system-packages` is passed, so the flag is
//! added when the probed version supports it.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::strategy::{InstallOutcome, InstallRequest, InstallStrategy};
use crate::manager::config::DEFAULT_INSTALLER_TIMEOUT;
use crate::manager::error::{ManagerError, ManagerResult};
use crate::manager::extractor::MemberProgress;

/// Strategy name used in logs and errors.
const NAME: &str = "trusted installer";

/// Timeout for `pip --version` and site-packages queries.
pub(super) const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between child status polls.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// First pip major version that understands `--break-system-packages`.
const BREAK_SYSTEM_PACKAGES_MAJOR: u32 = 23;

/// A pip invocation: program plus leading arguments (e.g. `python3 -m pip`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipCommand {
    program: PathBuf,
    args: Vec<String>,
}

impl PipCommand {
    /// A bare program name or path.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// A program with leading arguments.
    pub fn with_args<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }

    fn display(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Captured result of a finished child process.
#[derive(Debug)]
pub(super) struct ChildOutput {
    pub(super) status: ExitStatus,
    pub(super) stdout: String,
    pub(super) stderr: String,
}

/// Why [`run_with_timeout`] gave up.
#[derive(Debug)]
pub(super) enum RunError {
    Spawn(std::io::Error),
    Wait(std::io::Error),
    TimedOut(Duration),
}

/// Run `command` to completion, killing it once `timeout` elapses.
///
/// Output pipes are drained on helper threads so a chatty child can never
/// block on a full pipe while we poll.
pub(super) fn run_with_timeout(
    mut command: Command,
    timeout: Duration,
) -> Result<ChildOutput, RunError> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(RunError::Spawn)?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());
    let start = Instant::now();

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if start.elapsed() > timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(RunError::TimedOut(timeout));
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                let _ = child.kill();
                return Err(RunError::Wait(e));
            }
        }
    };

    Ok(ChildOutput {
        status,
        stdout: stdout.join().unwrap_or_default(),
        stderr: stderr.join().unwrap_or_default(),
    })
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut text = String::new();
        if let Some(mut pipe) = pipe {
            let mut bytes = Vec::new();
            if pipe.read_to_end(&mut bytes).is_ok() {
                text = String::from_utf8_lossy(&bytes).into_owned();
            }
        }
        text
    })
}

/// Parse `(major, minor)` from `pip --version` output such as
/// `pip 23.2.1 from /usr/lib/python3/dist-packages/pip (python 3.11)`.
pub fn parse_pip_version(output: &str) -> Option<(u32, u32)> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(r"pip (\d+)\.(\d+)").unwrap());

    let captures = pattern.captures(output)?;
    let major = captures.get(1)?.as_str().parse().ok()?;
    let minor = captures.get(2)?.as_str().parse().ok()?;
    Some((major, minor))
}

/// Installs wheels through the system package installer.
#[derive(Debug, Clone)]
pub struct TrustedInstaller {
    commands: Vec<PipCommand>,
    site_packages: Vec<PathBuf>,
    timeout: Duration,
}

impl Default for TrustedInstaller {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl TrustedInstaller {
    /// Create an installer probing `pip` then `pip3`.
    ///
    /// `site_packages` is searched for the entry point after a successful
    /// install to report where the package landed.
    pub fn new(site_packages: Vec<PathBuf>) -> Self {
        Self {
            commands: vec![PipCommand::new("pip"), PipCommand::new("pip3")],
            site_packages,
            timeout: DEFAULT_INSTALLER_TIMEOUT,
        }
    }

    /// Replace the candidate pip commands.
    pub fn with_commands(mut self, commands: Vec<PipCommand>) -> Self {
        self.commands = commands;
        self
    }

    /// Set the hard install timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Find the first working pip and its version output.
    fn find_pip(&self) -> Option<(&PipCommand, String)> {
        for candidate in &self.commands {
            let mut command = candidate.command();
            command.arg("--version");

            match run_with_timeout(command, PROBE_TIMEOUT) {
                Ok(output) if output.status.success() => {
                    info!(command = %candidate.display(), "Found pip command");
                    return Some((candidate, output.stdout));
                }
                Ok(output) => {
                    debug!(command = %candidate.display(), status = %output.status, "pip probe failed");
                }
                Err(e) => {
                    debug!(command = %candidate.display(), error = ?e, "pip probe failed");
                }
            }
        }
        None
    }

    /// Where the package landed: the first site-packages dir holding the
    /// entry point, else the first site-packages dir, else the target's
    /// first candidate. The base is always the target's first candidate.
    fn locate(&self, request: &InstallRequest) -> (PathBuf, PathBuf) {
        let base = request
            .target
            .candidates()
            .first()
            .cloned()
            .unwrap_or_default();

        if let Some(entry_point) = &request.entry_point {
            for dir in &self.site_packages {
                if dir.join(entry_point).exists() {
                    info!(path = %dir.display(), "Found installed entry point");
                    return (dir.clone(), base);
                }
            }
        }

        let fallback = self.site_packages.first().cloned().unwrap_or_else(|| base.clone());
        (fallback, base)
    }
}

impl InstallStrategy for TrustedInstaller {
    fn name(&self) -> &'static str {
        NAME
    }

    fn applies_to(&self, request: &InstallRequest) -> bool {
        request.is_wheel()
    }

    fn install(
        &self,
        request: &InstallRequest,
        _on_member: MemberProgress<'_>,
        cancel: &CancellationToken,
    ) -> ManagerResult<InstallOutcome> {
        if cancel.is_cancelled() {
            return Err(ManagerError::Cancelled);
        }

        let (pip, version_output) = self
            .find_pip()
            .ok_or_else(|| ManagerError::installer(NAME, "pip not found"))?;

        let mut command = pip.command();
        command.args(["install", "-v", "--force-reinstall"]);

        match parse_pip_version(&version_output) {
            Some((major, minor)) if major >= BREAK_SYSTEM_PACKAGES_MAJOR => {
                info!(major, minor, "pip supports --break-system-packages");
                command.arg("--break-system-packages");
            }
            Some((major, minor)) => {
                info!(major, minor, "pip does not support --break-system-packages");
            }
            None => {
                warn!(output = %version_output.trim(), "Could not parse pip version");
            }
        }

        command.arg(&request.artifact);
        info!(command = ?command, "Installing with pip");

        let output = run_with_timeout(command, self.timeout).map_err(|e| match e {
            RunError::TimedOut(limit) => {
                ManagerError::installer(NAME, format!("timed out after {}s", limit.as_secs()))
            }
            RunError::Spawn(e) | RunError::Wait(e) => ManagerError::installer(NAME, e.to_string()),
        })?;

        if !output.status.success() {
            let detail = if output.stderr.trim().is_empty() {
                output.stdout.trim()
            } else {
                output.stderr.trim()
            };
            return Err(ManagerError::installer(
                NAME,
                format!("pip exited with {}: {}", output.status, detail),
            ));
        }

        debug!(stdout = %output.stdout, stderr = %output.stderr, "pip output");

        let (install_path, base_dir) = self.locate(request);
        Ok(InstallOutcome {
            install_path,
            base_dir,
            message: "Installed successfully using pip".to_string(),
        })
    }
}
