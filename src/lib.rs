// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Dotfile manager backed by Git.
//!
//! Dotfiles are moved out of the home directory into a Git repository, and
//! replaced by links to their new location. The repository can then be
//! versioned, and synchronized across machines through a single remote.
//!
//! # See Also
//!
//! 1. [`DotfileRepo`]
//! 2. [`Dotfile`]
//! 3. [ArchWiki - dotfiles](https://wiki.archlinux.org/title/Dotfiles)

pub mod config;
pub mod dotfile;
pub mod inventory;
pub mod path;
pub mod repo;
pub mod vcs;

pub use config::Settings;
pub use dotfile::{Dotfile, LinkKind};
pub use inventory::{EntryAttributes, Inventory, InventoryEntry};
pub use repo::{DotfileRepo, RepoError};
pub use vcs::{Git2Vcs, VersionControl};
