// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Per-dotfile metadata store.
//!
//! The inventory is a tracked file at the top-level of the dotfile repository
//! named `.mdots_files`. It records attributes of each tracked dotfile that
//! cannot be recovered from the working tree alone, i.e., whether the dotfile
//! is linked into the home directory through a symlink or a hardlink.
//!
//! # Inventory File Layout
//!
//! One entry per line. Each entry starts with the repository relative path of
//! the dotfile, followed by `key=value` attribute fields. Fields are separated
//! by a colon:
//!
//! ```text
//! bashrc:hardlink=false
//! config/git/config:hardlink=true
//! ```
//!
//! Blank lines are ignored. Unknown attribute keys are rejected, so a file
//! written by a newer version is never silently stripped of information.

use crate::{
    dotfile::LinkKind,
    vcs::{VcsError, VersionControl},
};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{read_to_string, rename, write},
    io::ErrorKind,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{debug, instrument};

/// Name of inventory file at the top-level of the repository.
pub const INVENTORY_FILE: &str = ".mdots_files";

/// Name of temporary file used to replace the inventory file.
pub const INVENTORY_TMP_FILE: &str = ".mdots_files.tmp";

/// Field separator of inventory entries.
pub const SEPARATOR: char = ':';

/// Record of a single tracked dotfile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryEntry {
    /// Repository relative path of dotfile, using `/` as separator.
    pub path: String,

    /// Dotfile is linked into the home directory through a hardlink.
    pub hardlink: bool,
}

impl InventoryEntry {
    /// Construct new entry with default attributes.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            hardlink: false,
        }
    }

    /// Kind of link this entry records.
    pub fn link_kind(&self) -> LinkKind {
        LinkKind::from_hardlink(self.hardlink)
    }

    fn merge(&mut self, attributes: &EntryAttributes) {
        if let Some(hardlink) = attributes.hardlink {
            self.hardlink = hardlink;
        }
    }
}

impl Display for InventoryEntry {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{}{SEPARATOR}hardlink={}", self.path, self.hardlink)
    }
}

impl FromStr for InventoryEntry {
    type Err = EntryParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut fields = line.split(SEPARATOR);
        let path = fields.next().unwrap_or_default().trim();
        if path.is_empty() {
            return Err(EntryParseError::MissingPath);
        }

        let mut hardlink = None;
        for field in fields {
            let (key, value) = field
                .split_once('=')
                .ok_or_else(|| EntryParseError::MissingEquals {
                    field: field.to_string(),
                })?;
            let (key, value) = (key.trim(), value.trim());

            match key {
                "hardlink" => {
                    if hardlink.is_some() {
                        return Err(EntryParseError::DuplicateKey {
                            key: key.to_string(),
                        });
                    }
                    hardlink = Some(parse_bool(key, value)?);
                }
                _ => {
                    return Err(EntryParseError::UnknownKey {
                        key: key.to_string(),
                    })
                }
            }
        }

        Ok(Self {
            path: path.to_string(),
            hardlink: hardlink.unwrap_or_default(),
        })
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, EntryParseError> {
    match value {
        "true" | "True" => Ok(true),
        "false" | "False" => Ok(false),
        _ => Err(EntryParseError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Attributes to set on an inventory entry.
///
/// Fields left as `None` are not touched.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EntryAttributes {
    pub hardlink: Option<bool>,
}

impl EntryAttributes {
    /// Construct attributes that set the hardlink flag.
    pub fn hardlink(hardlink: bool) -> Self {
        Self {
            hardlink: Some(hardlink),
        }
    }

    /// Check if no attribute is given.
    pub fn is_empty(&self) -> bool {
        self.hardlink.is_none()
    }
}

impl From<LinkKind> for EntryAttributes {
    fn from(kind: LinkKind) -> Self {
        Self::hardlink(kind.is_hardlink())
    }
}

/// Inventory of tracked dotfiles.
///
/// Loaded lazily from the inventory file, mutated in memory, and saved back
/// explicitly.
///
/// # Invariant
///
/// - No two entries share a path.
/// - Entries keep insertion order.
/// - Dirty flag is set if and only if entries changed since the last load or
///   save.
#[derive(Debug, Clone)]
pub struct Inventory {
    file: PathBuf,
    tmp_file: PathBuf,
    entries: Vec<InventoryEntry>,
    loaded: bool,
    dirty: bool,
}

impl Inventory {
    /// Construct new unloaded inventory for repository directory.
    pub fn new(repo_dir: impl AsRef<Path>) -> Self {
        Self {
            file: repo_dir.as_ref().join(INVENTORY_FILE),
            tmp_file: repo_dir.as_ref().join(INVENTORY_TMP_FILE),
            entries: Vec::new(),
            loaded: false,
            dirty: false,
        }
    }

    /// Path to backing inventory file.
    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Check if inventory has been loaded from its backing file.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Check if inventory changed since it was last loaded or saved.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Load entries from backing file.
    ///
    /// Replaces all in-memory entries. A missing backing file means an empty
    /// inventory.
    ///
    /// # Errors
    ///
    /// - Return [`InventoryError::Read`] if backing file cannot be read.
    /// - Return [`InventoryError::Parse`] if any line is malformed.
    pub fn load(&mut self) -> Result<()> {
        let content = match read_to_string(&self.file) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => String::new(),
            Err(err) => {
                return Err(InventoryError::Read {
                    source: err,
                    path: self.file.clone(),
                })
            }
        };

        self.entries = parse_entries(&content, &self.file)?;
        self.loaded = true;
        self.dirty = false;
        debug!(
            "loaded {} inventory entries from {:?}",
            self.entries.len(),
            self.file.display()
        );

        Ok(())
    }

    /// Load entries from backing file unless already loaded.
    ///
    /// # Errors
    ///
    /// - Return [`InventoryError`] under the same conditions as
    ///   [`Inventory::load`].
    pub fn ensure_loaded(&mut self) -> Result<()> {
        if self.loaded {
            return Ok(());
        }

        self.load()
    }

    /// Write entries to backing file, and stage it.
    ///
    /// # Errors
    ///
    /// - Return [`InventoryError::Write`] if backing file cannot be replaced.
    /// - Return [`InventoryError::Vcs`] if backing file cannot be staged.
    pub fn save(&mut self, vcs: &impl VersionControl) -> Result<()> {
        self.write_file()?;
        vcs.stage([INVENTORY_FILE])?;
        self.dirty = false;

        Ok(())
    }

    fn write_file(&self) -> Result<()> {
        debug!("write inventory to {:?}", self.file.display());
        write(&self.tmp_file, self.to_string()).map_err(|err| InventoryError::Write {
            source: err,
            path: self.tmp_file.clone(),
        })?;
        rename(&self.tmp_file, &self.file).map_err(|err| InventoryError::Write {
            source: err,
            path: self.file.clone(),
        })
    }

    /// Edit inventory within a scope.
    ///
    /// Loads inventory if needed, and hands it to `editor`. If `editor`
    /// succeeds and changed anything, then the inventory is saved and staged
    /// exactly once. If `editor` fails, then nothing is saved, and the
    /// in-memory inventory may be left dirty.
    ///
    /// # Errors
    ///
    /// - Return error of `editor` if it fails.
    /// - Return [`InventoryError`] if loading or saving fails.
    #[instrument(skip(self, vcs, editor), level = "debug")]
    pub fn edit<V, T, F>(&mut self, vcs: &V, editor: F) -> Result<T>
    where
        V: VersionControl,
        F: FnOnce(&mut Self) -> Result<T>,
    {
        self.ensure_loaded()?;
        let output = editor(self)?;

        if self.dirty {
            self.save(vcs)?;
        }

        Ok(output)
    }

    /// Insert new entry.
    ///
    /// # Errors
    ///
    /// - Return [`InventoryError::EmptyPath`] if `path` is empty.
    /// - Return [`InventoryError::ReservedCharacter`] if `path` cannot be
    ///   written as an entry.
    /// - Return [`InventoryError::AlreadyPresent`] if `path` has an entry.
    pub fn add(&mut self, path: impl Into<String>, attributes: EntryAttributes) -> Result<()> {
        let path = path.into();
        check_path(&path)?;

        if self.contains(&path) {
            return Err(InventoryError::AlreadyPresent { path });
        }

        let mut entry = InventoryEntry::new(path);
        entry.merge(&attributes);
        debug!("add inventory entry {entry}");
        self.entries.push(entry);
        self.dirty = true;

        Ok(())
    }

    /// Merge attributes into existing entry.
    ///
    /// # Errors
    ///
    /// - Return [`InventoryError::NoAttributes`] if `attributes` is empty.
    /// - Return [`InventoryError::Missing`] if `path` has no entry.
    pub fn update(&mut self, path: &str, attributes: EntryAttributes) -> Result<()> {
        if attributes.is_empty() {
            return Err(InventoryError::NoAttributes {
                path: path.to_string(),
            });
        }

        let entry = self
            .entries
            .iter_mut()
            .find(|entry| entry.path == path)
            .ok_or_else(|| InventoryError::Missing {
                path: path.to_string(),
            })?;

        let before = entry.clone();
        entry.merge(&attributes);
        if *entry != before {
            debug!("update inventory entry {entry}");
            self.dirty = true;
        }

        Ok(())
    }

    /// Remove entry, returning it.
    ///
    /// # Errors
    ///
    /// - Return [`InventoryError::EmptyPath`] if `path` is empty.
    /// - Return [`InventoryError::Missing`] if `path` has no entry.
    pub fn remove(&mut self, path: &str) -> Result<InventoryEntry> {
        if path.is_empty() {
            return Err(InventoryError::EmptyPath);
        }

        let index = self
            .entries
            .iter()
            .position(|entry| entry.path == path)
            .ok_or_else(|| InventoryError::Missing {
                path: path.to_string(),
            })?;

        let entry = self.entries.remove(index);
        debug!("remove inventory entry {entry}");
        self.dirty = true;

        Ok(entry)
    }

    /// Check if `path` has an entry.
    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Get entry of `path`.
    pub fn get(&self, path: &str) -> Option<&InventoryEntry> {
        self.entries.iter().find(|entry| entry.path == path)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if inventory has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &InventoryEntry> {
        self.entries.iter()
    }
}

impl Display for Inventory {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        for entry in &self.entries {
            writeln!(fmt, "{entry}")?;
        }

        Ok(())
    }
}

impl<'a> IntoIterator for &'a Inventory {
    type Item = &'a InventoryEntry;
    type IntoIter = std::slice::Iter<'a, InventoryEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Check that `path` can be written as a single inventory entry.
///
/// # Errors
///
/// - Return [`InventoryError::EmptyPath`] if `path` is empty.
/// - Return [`InventoryError::ReservedCharacter`] if `path` contains the
///   field separator or a line break.
pub fn check_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(InventoryError::EmptyPath);
    }

    let reserved = |c: &char| matches!(*c, SEPARATOR | '\n' | '\r');
    if let Some(found) = path.chars().find(reserved) {
        return Err(InventoryError::ReservedCharacter {
            path: path.to_string(),
            found,
        });
    }

    Ok(())
}

fn parse_entries(content: &str, file: &Path) -> Result<Vec<InventoryEntry>> {
    let mut entries: Vec<InventoryEntry> = Vec::new();
    for (index, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let parse_error = |source| InventoryError::Parse {
            source,
            path: file.to_path_buf(),
            line: index + 1,
        };

        let entry = line.parse::<InventoryEntry>().map_err(parse_error)?;
        if entries.iter().any(|existing| existing.path == entry.path) {
            return Err(parse_error(EntryParseError::DuplicatePath { path: entry.path }));
        }
        entries.push(entry);
    }

    Ok(entries)
}

/// Malformed inventory entry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EntryParseError {
    #[error("entry has no path")]
    MissingPath,

    #[error("field {field:?} is not a key=value pair")]
    MissingEquals { field: String },

    #[error("key {key:?} given more than once")]
    DuplicateKey { key: String },

    #[error("unknown key {key:?}")]
    UnknownKey { key: String },

    #[error("invalid value {value:?} for key {key:?}")]
    InvalidValue { key: String, value: String },

    #[error("path {path:?} listed more than once")]
    DuplicatePath { path: String },
}

/// Inventory error types.
#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    /// Backing file cannot be read.
    #[error("failed to read inventory at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Backing file cannot be written.
    #[error("failed to write inventory at {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Backing file contains a malformed line.
    #[error("failed to parse inventory at {:?}, line {line}", path.display())]
    Parse {
        #[source]
        source: EntryParseError,
        path: PathBuf,
        line: usize,
    },

    /// Entry path is empty.
    #[error("inventory path is empty")]
    EmptyPath,

    /// Entry path contains a character the file layout reserves.
    #[error("inventory path {path:?} contains reserved character {found:?}")]
    ReservedCharacter { path: String, found: char },

    /// Entry path is already present.
    #[error("inventory already has an entry for {path:?}")]
    AlreadyPresent { path: String },

    /// Entry path is not present.
    #[error("inventory has no entry for {path:?}")]
    Missing { path: String },

    /// Update without any attribute.
    #[error("no attributes given to update {path:?}")]
    NoAttributes { path: String },

    /// Backing file cannot be staged.
    #[error(transparent)]
    Vcs(#[from] VcsError),
}

/// Friendly result alias :3
pub type Result<T, E = InventoryError> = std::result::Result<T, E>;
