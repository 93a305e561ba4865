// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Dotfile location model.
//!
//! Every tracked dotfile can be named in three coordinate spaces:
//!
//! 1. Its __logical path__, i.e., the dot-prefixed path relative to the home
//!    directory, e.g., `.config/nvim/init.lua`.
//! 2. Its __home path__, i.e., the absolute path of the link under the home
//!    directory.
//! 3. Its __repository path__, i.e., the absolute path of the real file inside
//!    the dotfile repository, with the leading dot of the first segment
//!    stripped, e.g., `$REPO/config/nvim/init.lua`.
//!
//! Given any one of these, the other two can be computed without touching the
//! file system. [`Dotfile::resolve`] performs that computation.

use crate::path::{remove_leading_dot, restore_leading_dot};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Component, Path, PathBuf},
};
use tracing::debug;

/// Kind of link placed in the home directory for a tracked dotfile.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkKind {
    /// Symbolic link pointing into the repository.
    #[default]
    Symlink,

    /// Second name for the same inode as the repository file.
    Hardlink,
}

impl LinkKind {
    /// Select link kind from a hardlink flag.
    pub fn from_hardlink(hardlink: bool) -> Self {
        if hardlink {
            Self::Hardlink
        } else {
            Self::Symlink
        }
    }

    /// Check if link kind is a hardlink.
    pub fn is_hardlink(self) -> bool {
        matches!(self, Self::Hardlink)
    }
}

impl Display for LinkKind {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Symlink => fmt.write_str("symlink"),
            Self::Hardlink => fmt.write_str("hardlink"),
        }
    }
}

/// Where a user supplied dotfile path was found to point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathOrigin {
    /// Relative path, taken as a logical path under the home directory.
    Relative,

    /// Absolute path inside the home directory.
    InHome,

    /// Absolute path inside the repository.
    InRepo,
}

impl PathOrigin {
    /// Classify a path against home and repository directories.
    ///
    /// When both directories are prefixes of `path` (the repository usually
    /// lives inside the home directory), the longer prefix wins.
    ///
    /// # Errors
    ///
    /// - Return [`InvalidDotfilePath`] if the path is empty, or is absolute
    ///   and lies in neither directory.
    pub fn classify(path: &Path, home_dir: &Path, repo_dir: &Path) -> Result<Self> {
        if path.as_os_str().is_empty() {
            return Err(InvalidDotfilePath::new(path, "path is empty"));
        }

        if path.is_relative() {
            return Ok(Self::Relative);
        }

        match (path.starts_with(home_dir), path.starts_with(repo_dir)) {
            (true, true) if repo_dir.starts_with(home_dir) => Ok(Self::InRepo),
            (true, _) => Ok(Self::InHome),
            (false, true) => Ok(Self::InRepo),
            (false, false) => Err(InvalidDotfilePath::new(
                path,
                "path is neither in the home directory nor in the repository",
            )),
        }
    }
}

/// A dotfile named in all three coordinate spaces.
///
/// # Invariant
///
/// - Logical path is relative, and its first segment starts with a dot.
/// - Repository relative path is the logical path with that dot removed.
/// - Home path and repository path are the logical path and repository
///   relative path joined onto their respective directories.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dotfile {
    logical_path: PathBuf,
    repo_relative: PathBuf,
    home_path: PathBuf,
    repo_path: PathBuf,
}

impl Dotfile {
    /// Resolve user supplied path into a dotfile.
    ///
    /// Accepts a relative logical path (the leading dot may be omitted), an
    /// absolute path inside the home directory, or an absolute path inside the
    /// repository. Existence of either file is not checked.
    ///
    /// # Errors
    ///
    /// - Return [`InvalidDotfilePath`] if the path cannot name a dotfile.
    pub fn resolve(path: impl AsRef<Path>, home_dir: &Path, repo_dir: &Path) -> Result<Self> {
        let path = path.as_ref();
        let origin = PathOrigin::classify(path, home_dir, repo_dir)?;
        debug!("resolve {:?} as {origin:?}", path.display());

        let logical_path = match origin {
            PathOrigin::Relative => dotted(normalize(path, path)?),
            PathOrigin::InHome => {
                let relative = normalize(path, strip(path, home_dir)?)?;
                if !starts_with_dot(&relative) {
                    return Err(InvalidDotfilePath::new(
                        path,
                        "file in home directory does not start with a dot",
                    ));
                }
                relative
            }
            PathOrigin::InRepo => Self::logical_from_repo(path, strip(path, repo_dir)?)?,
        };

        // INVARIANT: A name with two leading dots would still be dotted in the
        // repository, where dotted names belong to the repository itself.
        if starts_with_dot(&remove_leading_dot(&logical_path)) {
            return Err(InvalidDotfilePath::new(
                path,
                "path would name a repository internal file",
            ));
        }

        Ok(Self::from_logical(logical_path, home_dir, repo_dir))
    }

    /// Construct dotfile from a path relative to the repository root.
    ///
    /// # Errors
    ///
    /// - Return [`InvalidDotfilePath`] if the path names a repository internal
    ///   file, or is not a plain relative path.
    pub fn from_repo_relative(
        relative: impl AsRef<Path>,
        home_dir: &Path,
        repo_dir: &Path,
    ) -> Result<Self> {
        let relative = relative.as_ref();
        let logical_path = Self::logical_from_repo(relative, relative)?;
        Ok(Self::from_logical(logical_path, home_dir, repo_dir))
    }

    fn logical_from_repo(original: &Path, relative: &Path) -> Result<PathBuf> {
        let relative = normalize(original, relative)?;
        if starts_with_dot(&relative) {
            return Err(InvalidDotfilePath::new(
                original,
                "path names a repository internal file",
            ));
        }

        Ok(dotted(relative))
    }

    fn from_logical(logical_path: PathBuf, home_dir: &Path, repo_dir: &Path) -> Self {
        let repo_relative = remove_leading_dot(&logical_path);
        Self {
            home_path: home_dir.join(&logical_path),
            repo_path: repo_dir.join(&repo_relative),
            logical_path,
            repo_relative,
        }
    }

    /// Dot-prefixed path relative to the home directory.
    pub fn logical_path(&self) -> &Path {
        &self.logical_path
    }

    /// Path relative to the repository root.
    pub fn repo_relative(&self) -> &Path {
        &self.repo_relative
    }

    /// Absolute path of the link in the home directory.
    pub fn home_path(&self) -> &Path {
        &self.home_path
    }

    /// Absolute path of the real file in the repository.
    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Key of this dotfile in the inventory.
    ///
    /// Repository relative path with `/` as separator on every platform.
    pub fn inventory_key(&self) -> String {
        self.repo_relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

impl Display for Dotfile {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.logical_path.to_string_lossy().as_ref())
    }
}

fn strip<'a>(path: &'a Path, base: &Path) -> Result<&'a Path> {
    path.strip_prefix(base)
        .map_err(|_| InvalidDotfilePath::new(path, "path is outside of its base directory"))
}

// INVARIANT: Only plain segments survive, so a logical path never escapes its
// base directory.
fn normalize(original: &Path, relative: &Path) -> Result<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in relative.components() {
        match component {
            Component::Normal(segment) => normalized.push(segment),
            Component::CurDir => continue,
            _ => {
                return Err(InvalidDotfilePath::new(
                    original,
                    "path must not leave its base directory",
                ))
            }
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(InvalidDotfilePath::new(original, "path names no file"));
    }

    Ok(normalized)
}

fn dotted(relative: PathBuf) -> PathBuf {
    // INVARIANT: `relative` is normalized, so it is never absolute.
    restore_leading_dot(&relative).unwrap_or(relative)
}

fn starts_with_dot(relative: &Path) -> bool {
    relative
        .components()
        .next()
        .is_some_and(|first| first.as_os_str().to_string_lossy().starts_with('.'))
}

/// Supplied path does not name a dotfile.
#[derive(Clone, Debug, thiserror::Error)]
#[error("invalid dotfile path {:?}: {reason}", path.display())]
pub struct InvalidDotfilePath {
    pub path: PathBuf,
    pub reason: &'static str,
}

impl InvalidDotfilePath {
    fn new(path: &Path, reason: &'static str) -> Self {
        Self {
            path: path.to_path_buf(),
            reason,
        }
    }
}

/// Friendly result alias :3
type Result<T, E = InvalidDotfilePath> = std::result::Result<T, E>;
