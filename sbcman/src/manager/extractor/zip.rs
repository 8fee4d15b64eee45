//! Zip (and wheel) format handler.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

use ::zip::result::ZipError;
use ::zip::ZipArchive;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::{
    apply_mode, member_target, open_archive, write_member, ArchiveMember, MemberProgress,
    Selected,
};
use crate::manager::error::{ManagerError, ManagerResult};

fn open(archive: &Path) -> ManagerResult<ZipArchive<BufReader<File>>> {
    let file = open_archive(archive)?;
    ZipArchive::new(BufReader::new(file)).map_err(|e| invalid(archive, e))
}

fn invalid(archive: &Path, e: ZipError) -> ManagerError {
    match e {
        ZipError::Io(source) => ManagerError::io(archive, source),
        other => ManagerError::InvalidArchive {
            path: archive.to_path_buf(),
            reason: other.to_string(),
        },
    }
}

/// List every member without decompressing anything.
pub(super) fn read_members(archive: &Path) -> ManagerResult<Vec<ArchiveMember>> {
    let mut zip = open(archive)?;
    let mut members = Vec::with_capacity(zip.len());

    for index in 0..zip.len() {
        let entry = zip.by_index_raw(index).map_err(|e| invalid(archive, e))?;

        // Keep NUL bytes visible to the validator.
        let raw = entry.name_raw();
        let path = if raw.contains(&0) {
            String::from_utf8_lossy(raw).into_owned()
        } else {
            entry.name().to_string()
        };

        members.push(if entry.is_dir() {
            ArchiveMember::directory(path)
        } else {
            ArchiveMember::file(path, entry.size(), entry.compressed_size())
        });
    }

    Ok(members)
}

/// Extract the `selected` members, returning `(files, bytes)` written.
pub(super) fn extract_members(
    archive: &Path,
    dest_dir: &Path,
    selected: &[Selected],
    on_member: MemberProgress<'_>,
    cancel: &CancellationToken,
) -> ManagerResult<(usize, u64)> {
    let mut zip = open(archive)?;
    let mut files = 0;
    let mut bytes = 0;

    for (done, member) in selected.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(ManagerError::Cancelled);
        }

        let mut entry = zip.by_index(member.index).map_err(|e| invalid(archive, e))?;

        if entry.enclosed_name().is_none() {
            warn!(member = entry.name(), "Skipping member with unsafe name");
            continue;
        }

        let target = member_target(dest_dir, entry.name());

        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(|e| ManagerError::io(&target, e))?;
        } else {
            bytes += write_member(&mut entry, archive, &target, member.size)?;
            files += 1;

            if let Some(mode) = entry.unix_mode() {
                apply_mode(&target, mode)?;
            }
        }

        on_member(done + 1, selected.len());
    }

    Ok((files, bytes))
}
