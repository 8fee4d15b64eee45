//! Per-member validation shared by every archive format.
//!
//! Format handlers describe each member as an [`ArchiveMember`] and feed it
//! through a single [`MemberValidator`]. A member is accepted only if it
//! passes every rule:
//!
//! 1. Path safety: no absolute path, no `..` segment (raw or normalized),
//!    no NUL byte, not empty
//! 2. Entry kind: regular files and directories only
//! 3. Per-member size bound
//! 4. Compression ratio bound (skipped when the compressed size is zero)
//! 5. Aggregate size bound over accepted members
//!
//! Rejections are verdicts, not errors. Evaluation always continues with the
//! next member.

use std::fmt;

use crate::manager::config::ExtractionLimits;

/// Kind of an archive entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
    /// Hard link.
    HardLink,
    /// Character device, block device or FIFO.
    Device,
    /// Anything else the format can express (pax globals, sparse files...).
    Other,
}

impl EntryKind {
    /// Whether this kind may be written to disk.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::File | Self::Directory)
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::File => "file",
            Self::Directory => "directory",
            Self::Symlink => "symlink",
            Self::HardLink => "hard link",
            Self::Device => "device file",
            Self::Other => "special entry",
        };
        f.write_str(name)
    }
}

/// Format-independent description of one archive member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveMember {
    /// Path exactly as stored in the archive.
    pub path: String,
    /// Uncompressed size in bytes.
    pub size: u64,
    /// Compressed size in bytes (0 when unknown or empty).
    pub compressed_size: u64,
    /// Entry kind.
    pub kind: EntryKind,
}

impl ArchiveMember {
    /// Describe a regular file member.
    pub fn file(path: impl Into<String>, size: u64, compressed_size: u64) -> Self {
        Self {
            path: path.into(),
            size,
            compressed_size,
            kind: EntryKind::File,
        }
    }

    /// Describe a directory member.
    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            size: 0,
            compressed_size: 0,
            kind: EntryKind::Directory,
        }
    }

    /// Describe a member of an arbitrary kind.
    pub fn with_kind(path: impl Into<String>, size: u64, kind: EntryKind) -> Self {
        Self {
            path: path.into(),
            size,
            compressed_size: size,
            kind,
        }
    }
}

/// Why a member was excluded from extraction.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    /// Path is empty.
    EmptyPath,
    /// Path starts with a separator.
    AbsolutePath,
    /// Path contains a `..` segment, raw or after normalization.
    PathTraversal,
    /// Path contains a NUL byte.
    NulByte,
    /// Entry kind is not a regular file or directory.
    DisallowedKind(EntryKind),
    /// Member exceeds the per-member size bound.
    FileTooLarge { size: u64, max: u64 },
    /// Member would push the accepted total past the aggregate bound.
    TotalSizeExceeded { total: u64, max: u64 },
    /// Member's compression ratio exceeds the bound.
    CompressionRatio { ratio: f64, max: f64 },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyPath => write!(f, "empty path"),
            Self::AbsolutePath => write!(f, "absolute path"),
            Self::PathTraversal => write!(f, "path traversal"),
            Self::NulByte => write!(f, "null byte in path"),
            Self::DisallowedKind(kind) => write!(f, "{} not allowed", kind),
            Self::FileTooLarge { size, max } => {
                write!(f, "file too large ({} bytes, max {})", size, max)
            }
            Self::TotalSizeExceeded { total, max } => {
                write!(f, "total size would exceed limit ({} bytes, max {})", total, max)
            }
            Self::CompressionRatio { ratio, max } => {
                write!(f, "suspicious compression ratio ({:.1}x, max {:.1}x)", ratio, max)
            }
        }
    }
}

/// Outcome of validating one member.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Member may be extracted.
    Accept,
    /// Member is excluded.
    Reject(RejectReason),
}

impl Verdict {
    /// Whether the member was accepted.
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accept)
    }
}

/// Stateful validator applying every rule to a sequence of members.
///
/// The validator tracks the running total of accepted sizes, so one instance
/// must be used per archive, in member order.
#[derive(Debug, Clone)]
pub struct MemberValidator {
    limits: ExtractionLimits,
    accepted_total: u64,
}

impl MemberValidator {
    /// Create a validator with the given limits.
    pub fn new(limits: ExtractionLimits) -> Self {
        Self {
            limits,
            accepted_total: 0,
        }
    }

    /// Sum of the sizes of all accepted members so far.
    pub fn accepted_total(&self) -> u64 {
        self.accepted_total
    }

    /// Evaluate one member, counting it towards the total if accepted.
    pub fn evaluate(&mut self, member: &ArchiveMember) -> Verdict {
        match self.check(member) {
            Ok(()) => {
                self.accepted_total += member.size;
                Verdict::Accept
            }
            Err(reason) => Verdict::Reject(reason),
        }
    }

    fn check(&self, member: &ArchiveMember) -> Result<(), RejectReason> {
        check_path(&member.path)?;

        if !member.kind.is_allowed() {
            return Err(RejectReason::DisallowedKind(member.kind));
        }

        if member.size > self.limits.max_file_size {
            return Err(RejectReason::FileTooLarge {
                size: member.size,
                max: self.limits.max_file_size,
            });
        }

        if member.compressed_size > 0 {
            let ratio = member.size as f64 / member.compressed_size as f64;
            if ratio > self.limits.max_compression_ratio {
                return Err(RejectReason::CompressionRatio {
                    ratio,
                    max: self.limits.max_compression_ratio,
                });
            }
        }

        let total = self.accepted_total.saturating_add(member.size);
        if total > self.limits.max_total_size {
            return Err(RejectReason::TotalSizeExceeded {
                total,
                max: self.limits.max_total_size,
            });
        }

        Ok(())
    }
}

/// Check a raw member path for traversal, absolute paths and NUL bytes.
pub fn check_path(path: &str) -> Result<(), RejectReason> {
    if path.is_empty() {
        return Err(RejectReason::EmptyPath);
    }

    if path.starts_with('/') || path.starts_with('\\') {
        return Err(RejectReason::AbsolutePath);
    }

    if path.contains('\0') {
        return Err(RejectReason::NulByte);
    }

    if segments(path).any(|s| s == "..") {
        return Err(RejectReason::PathTraversal);
    }

    if normalize(path).starts_with("..") {
        return Err(RejectReason::PathTraversal);
    }

    Ok(())
}

/// Split a member path on either separator, dropping empty segments.
fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(['/', '\\']).filter(|s| !s.is_empty())
}

/// Lexically normalize a member path: drop `.`, fold `name/..` pairs.
///
/// Leading `..` segments that cannot be folded are kept.
pub fn normalize(path: &str) -> String {
    let mut stack: Vec<&str> = Vec::new();

    for segment in segments(path) {
        match segment {
            "." => {}
            ".." => match stack.last() {
                Some(&last) if last != ".." => {
                    stack.pop();
                }
                _ => stack.push(".."),
            },
            other => stack.push(other),
        }
    }

    stack.join("/")
}
