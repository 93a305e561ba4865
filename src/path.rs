// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Dotfiles live in two places at once: under the home directory with their
//! conventional leading dot, and inside the dotfile repository without it, so
//! the repository's working tree does not consist of hidden files. Only the
//! __first__ segment of a path carries that dot, e.g., `.config/nvim/init.lua`
//! in the home directory is `config/nvim/init.lua` in the repository.
//!
//! This module also determines the default locations the command line layer
//! falls back on. The library itself never consults them.

use std::{
    ffi::{OsStr, OsString},
    path::{Component, Path, PathBuf},
};

/// Strip the leading dot from the first segment of a path.
///
/// Leading `.` and `..` components are skipped and kept as-is. A first
/// segment that is just a dot, or that has no leading dot, is left alone.
/// Segments after the first one are never touched. Trailing separators do
/// not survive.
pub fn remove_leading_dot(path: impl AsRef<Path>) -> PathBuf {
    map_first_segment(path.as_ref(), |segment| match segment.to_str() {
        Some(name) if name.len() > 1 && name.starts_with('.') => OsString::from(&name[1..]),
        _ => segment.to_os_string(),
    })
}

/// Put the leading dot back onto the first segment of a relative path.
///
/// Inverse of [`remove_leading_dot`] for any path whose first segment started
/// with a single dot. A first segment that already starts with a dot is left
/// alone.
///
/// # Errors
///
/// - Return [`PathError::NotRelative`] if `path` is absolute.
pub fn restore_leading_dot(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    if path.has_root() || path.is_absolute() {
        return Err(PathError::NotRelative {
            path: path.to_path_buf(),
        });
    }

    Ok(map_first_segment(path, |segment| {
        if segment.to_string_lossy().starts_with('.') {
            return segment.to_os_string();
        }

        let mut dotted = OsString::from(".");
        dotted.push(segment);
        dotted
    }))
}

fn map_first_segment(path: &Path, mapper: impl FnOnce(&OsStr) -> OsString) -> PathBuf {
    let mut mapper = Some(mapper);
    path.components()
        .map(|component| match component {
            Component::Normal(segment) => match mapper.take() {
                Some(mapper) => mapper(segment),
                None => segment.to_os_string(),
            },
            other => other.as_os_str().to_os_string(),
        })
        .collect()
}

/// Determine absolute path to user's home directory.
///
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`PathError::NoWayHome`] if home directory path cannot be
///   determined.
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or(PathError::NoWayHome)
}

/// Determine default absolute path to the dotfile repository.
///
/// Uses `$HOME/dotfiles`. Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`PathError::NoWayHome`] if home directory path cannot be
///   determined.
pub fn default_repo_dir() -> Result<PathBuf> {
    home_dir().map(|path| path.join("dotfiles"))
}

/// Determine default absolute path to the configuration file.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/moredots/config.toml`.
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`PathError::NoWayHome`] if configuration directory path cannot
///   be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_config_file() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("moredots").join("config.toml"))
        .ok_or(PathError::NoWayHome)
}

/// Path resolution error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum PathError {
    /// No way to determine user's home directory.
    #[error("cannot determine absolute path to user's home directory")]
    NoWayHome,

    /// Relative path expected.
    #[error("expected relative path, got {:?}", path.display())]
    NotRelative { path: PathBuf },
}

/// Friendly result alias :3
pub type Result<T, E = PathError> = std::result::Result<T, E>;
