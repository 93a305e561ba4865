// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! File system link primitives.
//!
//! Thin wrappers over the standard library that attach the offending path to
//! every I/O error.

use crate::dotfile::LinkKind;

use std::{
    fs::{hard_link, read_link, remove_dir, remove_file, rename, symlink_metadata, Metadata},
    io,
    path::{Path, PathBuf},
};
use tracing::debug;

#[cfg(windows)]
use std::fs::read;

/// I/O failure on a specific path.
#[derive(Debug, thiserror::Error)]
#[error("failed to {action} {:?}", path.display())]
pub struct LinkError {
    pub action: &'static str,
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

impl LinkError {
    pub(crate) fn new(action: &'static str, path: &Path, source: io::Error) -> Self {
        Self {
            action,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Friendly result alias :3
pub(crate) type Result<T, E = LinkError> = std::result::Result<T, E>;

/// Move file, creating missing parent directories of the destination.
pub(crate) fn move_file(from: &Path, to: &Path) -> Result<()> {
    debug!("move {:?} to {:?}", from.display(), to.display());
    create_parents(to)?;
    rename(from, to).map_err(|err| LinkError::new("move", from, err))
}

/// Create link at `link` that refers to `original`.
pub(crate) fn create_link(original: &Path, link: &Path, kind: LinkKind) -> Result<()> {
    debug!("{kind} {:?} -> {:?}", link.display(), original.display());
    create_parents(link)?;
    match kind {
        LinkKind::Symlink => symlink(original, link),
        LinkKind::Hardlink => hard_link(original, link),
    }
    .map_err(|err| LinkError::new("link", link, err))
}

#[cfg(unix)]
fn symlink(original: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(windows)]
fn symlink(original: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(original, link)
}

/// Remove whatever file or link sits at `path`.
///
/// Returns `false` if nothing was there. Directories are never removed.
pub(crate) fn remove_existing(path: &Path) -> Result<bool> {
    match symlink_metadata(path) {
        Ok(_) => {
            debug!("remove {:?}", path.display());
            remove_file(path).map_err(|err| LinkError::new("remove", path, err))?;
            Ok(true)
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(LinkError::new("inspect", path, err)),
    }
}

/// Replace whatever sits at `link` with a fresh link to `original`.
pub(crate) fn replace_with_link(original: &Path, link: &Path, kind: LinkKind) -> Result<()> {
    remove_existing(link)?;
    create_link(original, link, kind)
}

/// Check if `path` is a symlink whose target lies inside `dir`.
pub(crate) fn is_symlink_into(path: &Path, dir: &Path) -> bool {
    match read_link(path) {
        Ok(target) => target.starts_with(dir),
        Err(_) => false,
    }
}

/// Check if `path` is a symlink to `original`, or a second name of it.
pub(crate) fn is_link_to(path: &Path, original: &Path) -> Result<bool> {
    let metadata = symlink_metadata(path).map_err(|err| LinkError::new("inspect", path, err))?;
    if metadata.file_type().is_symlink() {
        let target = read_link(path).map_err(|err| LinkError::new("read link", path, err))?;
        return Ok(target == original);
    }

    if !metadata.is_file() {
        return Ok(false);
    }

    same_file(path, &metadata, original)
}

#[cfg(unix)]
fn same_file(_: &Path, metadata: &Metadata, original: &Path) -> Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let other =
        symlink_metadata(original).map_err(|err| LinkError::new("inspect", original, err))?;
    Ok(metadata.dev() == other.dev() && metadata.ino() == other.ino())
}

// INVARIANT: Without stable file identities, a hardlink is only recognized by
// identical content.
#[cfg(windows)]
fn same_file(path: &Path, metadata: &Metadata, original: &Path) -> Result<bool> {
    let other =
        symlink_metadata(original).map_err(|err| LinkError::new("inspect", original, err))?;
    if metadata.len() != other.len() {
        return Ok(false);
    }

    let content = read(path).map_err(|err| LinkError::new("read", path, err))?;
    let expect = read(original).map_err(|err| LinkError::new("read", original, err))?;
    Ok(content == expect)
}

/// Remove empty directories from `start` upwards, stopping at `stop`.
pub(crate) fn prune_empty_parents(start: &Path, stop: &Path) {
    let mut current = start.parent();
    while let Some(dir) = current {
        if dir == stop || !dir.starts_with(stop) {
            break;
        }

        // INVARIANT: Fails on non-empty directories, which ends the climb.
        if remove_dir(dir).is_err() {
            break;
        }
        debug!("removed empty directory {:?}", dir.display());
        current = dir.parent();
    }
}

fn create_parents(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            mkdirp::mkdirp(parent).map_err(|err| LinkError::new("create directory", parent, err))?;
            Ok(())
        }
        _ => Ok(()),
    }
}
