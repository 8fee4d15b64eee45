//! Tar family format handler (`.tar`, `.tar.gz`, `.tgz`, `.tar.bz2`, `.tar.xz`).
//!
//! Tar members carry no separate compressed size, so each member reports its
//! compressed size equal to its size and the ratio rule never fires. Stream
//! compression is bounded by the per-member and aggregate size limits.

use std::fs;
use std::io::{BufReader, Read};
use std::path::Path;

use ::tar::{Archive, EntryType};
use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use tokio_util::sync::CancellationToken;
use xz2::read::XzDecoder;

use super::{
    apply_mode, member_target, open_archive, write_member, ArchiveFormat, ArchiveMember,
    EntryKind, MemberProgress, Selected,
};
use crate::manager::error::{ManagerError, ManagerResult};

fn open(archive: &Path, format: ArchiveFormat) -> ManagerResult<Archive<Box<dyn Read>>> {
    let file = BufReader::new(open_archive(archive)?);

    let reader: Box<dyn Read> = match format {
        ArchiveFormat::Tar => Box::new(file),
        ArchiveFormat::TarGz => Box::new(GzDecoder::new(file)),
        ArchiveFormat::TarBz2 => Box::new(BzDecoder::new(file)),
        ArchiveFormat::TarXz => Box::new(XzDecoder::new(file)),
        ArchiveFormat::Zip => {
            return Err(ManagerError::UnsupportedFormat(format!("{:?}", format)));
        }
    };

    Ok(Archive::new(reader))
}

fn invalid(archive: &Path, e: std::io::Error) -> ManagerError {
    ManagerError::InvalidArchive {
        path: archive.to_path_buf(),
        reason: e.to_string(),
    }
}

fn entry_kind(entry_type: EntryType) -> EntryKind {
    if entry_type.is_file() {
        EntryKind::File
    } else if entry_type.is_dir() {
        EntryKind::Directory
    } else if entry_type.is_symlink() {
        EntryKind::Symlink
    } else if entry_type.is_hard_link() {
        EntryKind::HardLink
    } else if entry_type.is_character_special()
        || entry_type.is_block_special()
        || entry_type.is_fifo()
    {
        EntryKind::Device
    } else {
        EntryKind::Other
    }
}

/// List every member, decompressing the stream but writing nothing.
pub(super) fn read_members(
    archive: &Path,
    format: ArchiveFormat,
) -> ManagerResult<Vec<ArchiveMember>> {
    let mut tar = open(archive, format)?;
    let mut members = Vec::new();

    for entry in tar.entries().map_err(|e| invalid(archive, e))? {
        let entry = entry.map_err(|e| invalid(archive, e))?;
        let path = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        let kind = entry_kind(entry.header().entry_type());

        members.push(ArchiveMember::with_kind(path, entry.size(), kind));
    }

    Ok(members)
}

/// Extract the `selected` members, returning `(files, bytes)` written.
///
/// `selected` must be in ascending index order; it comes from the listing
/// pass.
pub(super) fn extract_members(
    archive: &Path,
    format: ArchiveFormat,
    dest_dir: &Path,
    selected: &[Selected],
    on_member: MemberProgress<'_>,
    cancel: &CancellationToken,
) -> ManagerResult<(usize, u64)> {
    let mut tar = open(archive, format)?;
    let mut wanted = selected.iter().peekable();
    let mut done = 0;
    let mut files = 0;
    let mut bytes = 0;

    for (index, entry) in tar
        .entries()
        .map_err(|e| invalid(archive, e))?
        .enumerate()
    {
        if wanted.peek().is_none() {
            break;
        }
        if cancel.is_cancelled() {
            return Err(ManagerError::Cancelled);
        }

        let mut entry = entry.map_err(|e| invalid(archive, e))?;
        let size = match wanted.peek() {
            Some(member) if member.index == index => member.size,
            _ => continue,
        };
        wanted.next();

        let path = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        let target = member_target(dest_dir, &path);

        if entry.header().entry_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| ManagerError::io(&target, e))?;
        } else {
            let mode = entry.header().mode().ok();
            bytes += write_member(&mut entry, archive, &target, size)?;
            files += 1;

            if let Some(mode) = mode {
                apply_mode(&target, mode)?;
            }
        }

        done += 1;
        on_member(done, selected.len());
    }

    Ok((files, bytes))
}

#[cfg(test)]
mod tests {
    use super::super::test_archives::{append_raw, append_symlink};
    use super::super::{ArchiveExtractor, RejectReason};
    use super::*;
    use crate::manager::config::ExtractionLimits;
    use std::fs::File;
    use std::io::{self, Write};
    use tempfile::TempDir;

    fn append_file<W: Write>(builder: &mut ::tar::Builder<W>, name: &str, content: &[u8]) {
        let mut header = ::tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, name, content).unwrap();
    }

    fn append_dir<W: Write>(builder: &mut ::tar::Builder<W>, name: &str) {
        let mut header = ::tar::Header::new_gnu();
        header.set_entry_type(EntryType::Directory);
        header.set_size(0);
        header.set_mode(0o755);
        builder.append_data(&mut header, name, io::empty()).unwrap();
    }

    fn append_device<W: Write>(builder: &mut ::tar::Builder<W>, name: &str) {
        let mut header = ::tar::Header::new_gnu();
        header.set_entry_type(EntryType::Char);
        header.set_size(0);
        header.set_mode(0o600);
        builder.append_data(&mut header, name, io::empty()).unwrap();
    }

    fn write_tar_gz(path: &Path, fill: impl FnOnce(&mut ::tar::Builder<Vec<u8>>)) {
        let mut builder = ::tar::Builder::new(Vec::new());
        fill(&mut builder);
        let tar = builder.into_inner().unwrap();

        let file = File::create(path).unwrap();
        let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        encoder.write_all(&tar).unwrap();
        encoder.finish().unwrap();
    }

    #[test]
    fn test_tar_gz_round_trip() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("pong.tar.gz");
        write_tar_gz(&archive, |b| {
            append_dir(b, "pong/");
            append_file(b, "pong/main.py", b"import pygame\n");
            append_file(b, "pong/data/level1.txt", b"#####\n#...#\n#####\n");
        });
        let dest = temp.path().join("games");

        let report = ArchiveExtractor::default().extract(&archive, &dest).unwrap();

        assert_eq!(report.format, ArchiveFormat::TarGz);
        assert!(report.rejected.is_empty());
        assert_eq!(report.files_written, 2);
        assert_eq!(
            fs::read(dest.join("pong/main.py")).unwrap(),
            b"import pygame\n"
        );
        assert_eq!(
            fs::read(dest.join("pong/data/level1.txt")).unwrap(),
            b"#####\n#...#\n#####\n"
        );
    }

    #[test]
    fn test_symlink_and_traversal_rejected() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("evil.tgz");
        write_tar_gz(&archive, |b| {
            append_symlink(b, "pong/passwd", "/etc/passwd");
            append_raw(b, "../escape.txt", b"gotcha");
            append_file(b, "pong/main.py", b"ok");
        });
        let dest = temp.path().join("out");

        let report = ArchiveExtractor::default().extract(&archive, &dest).unwrap();

        assert_eq!(report.accepted.len(), 1);
        assert_eq!(report.accepted[0].path, "pong/main.py");
        assert_eq!(
            report.rejected[0].1,
            RejectReason::DisallowedKind(EntryKind::Symlink)
        );
        assert_eq!(report.rejected[1].1, RejectReason::PathTraversal);
        assert!(!dest.join("pong/passwd").exists());
        assert!(fs::symlink_metadata(dest.join("pong/passwd")).is_err());
        assert!(!temp.path().join("escape.txt").exists());
        assert_eq!(fs::read(dest.join("pong/main.py")).unwrap(), b"ok");
    }

    #[test]
    fn test_device_entry_rejected() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("dev.tar");
        let mut builder = ::tar::Builder::new(File::create(&archive).unwrap());
        append_device(&mut builder, "dev/tty0");
        append_file(&mut builder, "readme.txt", b"hi");
        builder.into_inner().unwrap();

        let listing = ArchiveExtractor::default().inspect(&archive).unwrap();

        assert_eq!(listing[0].0.kind, EntryKind::Device);
        assert_eq!(
            listing[0].1,
            super::super::Verdict::Reject(RejectReason::DisallowedKind(EntryKind::Device))
        );
        assert!(listing[1].1.is_accepted());
    }

    #[test]
    fn test_tar_bz2_and_xz_decode() {
        let temp = TempDir::new().unwrap();
        let mut builder = ::tar::Builder::new(Vec::new());
        append_file(&mut builder, "main.py", b"print('hi')");
        let tar = builder.into_inner().unwrap();

        let bz2 = temp.path().join("game.tar.bz2");
        let mut encoder = bzip2::write::BzEncoder::new(
            File::create(&bz2).unwrap(),
            bzip2::Compression::default(),
        );
        encoder.write_all(&tar).unwrap();
        encoder.finish().unwrap();

        let xz = temp.path().join("game.tar.xz");
        let mut encoder = xz2::write::XzEncoder::new(File::create(&xz).unwrap(), 6);
        encoder.write_all(&tar).unwrap();
        encoder.finish().unwrap();

        for archive in [bz2, xz] {
            let members = read_members(&archive, ArchiveFormat::from_path(&archive).unwrap())
                .unwrap();
            assert_eq!(members, vec![ArchiveMember::file("main.py", 11, 11)]);
        }
    }

    #[test]
    fn test_oversized_member_skipped_others_extracted() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("big.tar");
        let mut builder = ::tar::Builder::new(File::create(&archive).unwrap());
        append_file(&mut builder, "big.bin", &[0u8; 2048]);
        append_file(&mut builder, "small.txt", b"small");
        builder.into_inner().unwrap();

        let limits = ExtractionLimits {
            max_file_size: 1024,
            ..ExtractionLimits::default()
        };
        let dest = temp.path().join("out");
        let report = ArchiveExtractor::new(limits).extract(&archive, &dest).unwrap();

        assert_eq!(
            report.rejected[0].1,
            RejectReason::FileTooLarge {
                size: 2048,
                max: 1024
            }
        );
        assert!(!dest.join("big.bin").exists());
        assert_eq!(fs::read(dest.join("small.txt")).unwrap(), b"small");
    }

    #[test]
    fn test_truncated_gzip_is_invalid_archive() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("broken.tar.gz");
        fs::write(&archive, [0x1f, 0x8b, 0x08, 0x00, 0x00]).unwrap();

        let result = read_members(&archive, ArchiveFormat::TarGz);
        assert!(matches!(result, Err(ManagerError::InvalidArchive { .. })));
    }
}
