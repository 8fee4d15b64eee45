//! Validated archive extraction.
//!
//! This module handles:
//! - Detecting the archive format from the file name
//! - Enumerating members and screening them through [`MemberValidator`]
//! - Extracting only the accepted members
//!
//! Extraction always runs in two passes. The first pass lists every member
//! without writing anything; the second pass hands the format handler the
//! indices of accepted members and nothing else.

mod tar;
mod validator;
mod zip;

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::ExtractionLimits;
use super::error::{ManagerError, ManagerResult};

pub use validator::{
    check_path, normalize, ArchiveMember, EntryKind, MemberValidator, RejectReason, Verdict,
};

/// Buffer size for copying member contents.
const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// An accepted member handed to a format handler: its position in the
/// archive and the size it was validated at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Selected {
    index: usize,
    size: u64,
}

/// Callback invoked after each extracted member with `(done, total)`.
pub type MemberProgress<'a> = &'a mut dyn FnMut(usize, usize);

/// Supported archive formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// `.zip` and `.whl`.
    Zip,
    /// `.tar`.
    Tar,
    /// `.tar.gz` / `.tgz`.
    TarGz,
    /// `.tar.bz2`.
    TarBz2,
    /// `.tar.xz`.
    TarXz,
}

impl ArchiveFormat {
    /// Detect the format from the file name.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();

        if name.ends_with(".zip") || name.ends_with(".whl") {
            Some(Self::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".tar.bz2") {
            Some(Self::TarBz2)
        } else if name.ends_with(".tar.xz") {
            Some(Self::TarXz)
        } else if name.ends_with(".tar") {
            Some(Self::Tar)
        } else {
            None
        }
    }

    /// Whether this is one of the tar family formats.
    pub fn is_tar(&self) -> bool {
        !matches!(self, Self::Zip)
    }
}

/// Result of a validated extraction.
#[derive(Debug, Clone)]
pub struct ExtractionReport {
    /// Detected archive format.
    pub format: ArchiveFormat,
    /// Directory the members were written into.
    pub dest_dir: PathBuf,
    /// Members that passed validation, in archive order.
    pub accepted: Vec<ArchiveMember>,
    /// Members that were excluded and why.
    pub rejected: Vec<(ArchiveMember, RejectReason)>,
    /// Number of regular files written.
    pub files_written: usize,
    /// Total bytes written.
    pub bytes_written: u64,
}

/// Secure extractor for zip and tar family archives.
#[derive(Debug, Clone, Default)]
pub struct ArchiveExtractor {
    limits: ExtractionLimits,
}

impl ArchiveExtractor {
    /// Create an extractor with the given limits.
    pub fn new(limits: ExtractionLimits) -> Self {
        Self { limits }
    }

    /// Limits applied to each archive.
    pub fn limits(&self) -> &ExtractionLimits {
        &self.limits
    }

    /// List every member of an archive together with its verdict.
    ///
    /// Nothing is written to disk.
    pub fn inspect(&self, archive: &Path) -> ManagerResult<Vec<(ArchiveMember, Verdict)>> {
        let format = detect_format(archive)?;
        let members = read_members(archive, format)?;
        let mut validator = MemberValidator::new(self.limits);

        Ok(members
            .into_iter()
            .map(|member| {
                let verdict = validator.evaluate(&member);
                (member, verdict)
            })
            .collect())
    }

    /// Extract an archive into `dest_dir`.
    pub fn extract(&self, archive: &Path, dest_dir: &Path) -> ManagerResult<ExtractionReport> {
        self.extract_with(archive, dest_dir, &mut |_, _| {}, &CancellationToken::new())
    }

    /// Extract an archive, reporting per-member progress.
    ///
    /// The token is polled before each member; cancellation stops the
    /// extraction with [`ManagerError::Cancelled`].
    pub fn extract_with(
        &self,
        archive: &Path,
        dest_dir: &Path,
        on_member: MemberProgress<'_>,
        cancel: &CancellationToken,
    ) -> ManagerResult<ExtractionReport> {
        let format = detect_format(archive)?;
        fs::create_dir_all(dest_dir).map_err(|e| ManagerError::io(dest_dir, e))?;

        info!(archive = %archive.display(), ?format, "Extracting archive");

        let members = read_members(archive, format)?;
        let mut validator = MemberValidator::new(self.limits);
        let mut selected = Vec::new();
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();

        for (index, member) in members.into_iter().enumerate() {
            match validator.evaluate(&member) {
                Verdict::Accept => {
                    debug!(member = %member.path, size = member.size, "Accepted");
                    selected.push(Selected {
                        index,
                        size: member.size,
                    });
                    accepted.push(member);
                }
                Verdict::Reject(reason) => {
                    warn!(member = %member.path, %reason, "Skipping archive member");
                    rejected.push((member, reason));
                }
            }
        }

        info!(
            accepted = accepted.len(),
            rejected = rejected.len(),
            total_bytes = validator.accepted_total(),
            "Archive validation complete"
        );

        let (files_written, bytes_written) = if format.is_tar() {
            tar::extract_members(archive, format, dest_dir, &selected, on_member, cancel)?
        } else {
            zip::extract_members(archive, dest_dir, &selected, on_member, cancel)?
        };

        info!(dest = %dest_dir.display(), files_written, bytes_written, "Extracted");

        Ok(ExtractionReport {
            format,
            dest_dir: dest_dir.to_path_buf(),
            accepted,
            rejected,
            files_written,
            bytes_written,
        })
    }
}

fn detect_format(archive: &Path) -> ManagerResult<ArchiveFormat> {
    ArchiveFormat::from_path(archive).ok_or_else(|| {
        let name = archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        ManagerError::UnsupportedFormat(name)
    })
}

fn read_members(archive: &Path, format: ArchiveFormat) -> ManagerResult<Vec<ArchiveMember>> {
    if format.is_tar() {
        tar::read_members(archive, format)
    } else {
        zip::read_members(archive)
    }
}

/// Open an archive file, mapping failures to [`ManagerError::IoFailure`].
fn open_archive(archive: &Path) -> ManagerResult<File> {
    File::open(archive).map_err(|e| ManagerError::io(archive, e))
}

/// Resolve a validated member path under the destination directory.
fn member_target(dest_dir: &Path, member_path: &str) -> PathBuf {
    let mut target = dest_dir.to_path_buf();
    for segment in normalize(member_path).split('/').filter(|s| !s.is_empty()) {
        target.push(segment);
    }
    target
}

/// Copy one member's content to `target`, creating parent directories.
///
/// At most `declared` bytes are written. A member that decodes to more than
/// it declared is a lying header: the partial file is removed and the
/// archive reported invalid. Read errors mean the archive is damaged; write
/// errors are disk failures.
fn write_member(
    reader: &mut dyn Read,
    archive: &Path,
    target: &Path,
    declared: u64,
) -> ManagerResult<u64> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| ManagerError::io(parent, e))?;
    }

    let result = copy_limited(reader, archive, target, declared);
    if result.is_err() {
        if let Err(e) = fs::remove_file(target) {
            debug!(target = %target.display(), error = %e, "Failed to remove partial member");
        }
    }
    result
}

fn copy_limited(
    reader: &mut dyn Read,
    archive: &Path,
    target: &Path,
    declared: u64,
) -> ManagerResult<u64> {
    let damaged = |e: std::io::Error| ManagerError::InvalidArchive {
        path: archive.to_path_buf(),
        reason: format!("failed to read {}: {}", target.display(), e),
    };

    let file = File::create(target).map_err(|e| ManagerError::io(target, e))?;
    let mut writer = BufWriter::new(file);
    let mut limited = (&mut *reader).take(declared);
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    let mut written = 0u64;

    loop {
        let bytes_read = limited.read(&mut buffer).map_err(damaged)?;
        if bytes_read == 0 {
            break;
        }

        writer
            .write_all(&buffer[..bytes_read])
            .map_err(|e| ManagerError::io(target, e))?;
        written += bytes_read as u64;
    }

    let mut extra = [0u8; 1];
    if limited.into_inner().read(&mut extra).map_err(damaged)? > 0 {
        warn!(
            member = %target.display(),
            declared,
            "Member is larger than its header claims"
        );
        return Err(ManagerError::InvalidArchive {
            path: archive.to_path_buf(),
            reason: format!(
                "{} decodes to more than its declared {} bytes",
                target.display(),
                declared
            ),
        });
    }

    writer.flush().map_err(|e| ManagerError::io(target, e))?;

    Ok(written)
}

/// Apply archive permission bits, keeping the owner able to rewrite the file.
#[cfg(unix)]
fn apply_mode(target: &Path, mode: u32) -> ManagerResult<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = (mode & 0o777) | 0o600;
    fs::set_permissions(target, fs::Permissions::from_mode(mode))
        .map_err(|e| ManagerError::io(target, e))
}

#[cfg(not(unix))]
fn apply_mode(_target: &Path, _mode: u32) -> ManagerResult<()> {
    Ok(())
}
