// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Repository mutation as a single value.
//!
//! Adding or removing a dotfile touches three things: the file system, the
//! inventory, and the index of the repository. A [`Transaction`] collects all
//! of these side effects first, then applies them in a fixed order:
//!
//! 1. Link change.
//! 2. Inventory delta, saved and staged.
//! 3. Index staging and unstaging.
//! 4. Commit.
//!
//! There is no rollback. If a step fails, then every step before it stays
//! applied, and the failure is reported with the number of completed steps.

use crate::{
    dotfile::{Dotfile, LinkKind},
    inventory::{EntryAttributes, Inventory, InventoryError},
    repo::{link, RepoError},
    vcs::VersionControl,
};

use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

const STEPS: usize = 4;

/// File system side of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LinkChange {
    /// Move dotfile into the repository, and link it back home.
    Adopt { dotfile: Dotfile, kind: LinkKind },

    /// Drop the home link, and move dotfile back home.
    Release { dotfile: Dotfile },
}

/// Inventory side of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum InventoryDelta {
    Insert {
        path: String,
        attributes: EntryAttributes,
    },
    Remove {
        path: String,
    },
}

/// Pending repository mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Transaction {
    link: LinkChange,
    delta: InventoryDelta,
    stage: Vec<PathBuf>,
    unstage: Vec<PathBuf>,
    message: String,
}

impl Transaction {
    /// Plan adoption of a dotfile into the repository.
    pub(crate) fn adopt(dotfile: Dotfile, kind: LinkKind) -> Self {
        Self {
            delta: InventoryDelta::Insert {
                path: dotfile.inventory_key(),
                attributes: kind.into(),
            },
            stage: vec![dotfile.repo_relative().to_path_buf()],
            unstage: Vec::new(),
            message: format!("[moredots] Add {dotfile}"),
            link: LinkChange::Adopt { dotfile, kind },
        }
    }

    /// Plan release of a dotfile back to the home directory.
    pub(crate) fn release(dotfile: Dotfile) -> Self {
        Self {
            delta: InventoryDelta::Remove {
                path: dotfile.inventory_key(),
            },
            stage: Vec::new(),
            unstage: vec![dotfile.repo_relative().to_path_buf()],
            message: format!("[moredots] Remove {dotfile}"),
            link: LinkChange::Release { dotfile },
        }
    }

    /// Commit message the transaction ends with.
    pub(crate) fn message(&self) -> &str {
        &self.message
    }

    /// Apply every side effect in order.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError`] of the first step that fails. Earlier steps are
    ///   not undone.
    pub(crate) fn apply<V>(self, repo_dir: &Path, inventory: &mut Inventory, vcs: &V) -> Result<()>
    where
        V: VersionControl,
    {
        let mut completed = 0;
        let result = self.run(repo_dir, inventory, vcs, &mut completed);
        if let Err(err) = &result {
            error!(
                "{:?} stopped after {completed} of {STEPS} steps, repository left as is: {err}",
                self.message
            );
        }

        result
    }

    fn run<V>(
        &self,
        repo_dir: &Path,
        inventory: &mut Inventory,
        vcs: &V,
        completed: &mut usize,
    ) -> Result<()>
    where
        V: VersionControl,
    {
        self.apply_link(repo_dir)?;
        *completed += 1;

        inventory.edit(vcs, |inventory| self.apply_delta(inventory))?;
        *completed += 1;

        if !self.stage.is_empty() {
            vcs.stage(&self.stage)?;
        }
        if !self.unstage.is_empty() {
            vcs.unstage(&self.unstage)?;
        }
        *completed += 1;

        vcs.commit(&self.message)?;
        *completed += 1;

        Ok(())
    }

    fn apply_link(&self, repo_dir: &Path) -> Result<()> {
        match &self.link {
            LinkChange::Adopt { dotfile, kind } => {
                link::move_file(dotfile.home_path(), dotfile.repo_path())?;
                link::create_link(dotfile.repo_path(), dotfile.home_path(), *kind)?;
            }
            LinkChange::Release { dotfile } => {
                if !link::remove_existing(dotfile.home_path())? {
                    debug!("no link left at {:?}", dotfile.home_path().display());
                }
                link::move_file(dotfile.repo_path(), dotfile.home_path())?;
                link::prune_empty_parents(dotfile.repo_path(), repo_dir);
            }
        }

        Ok(())
    }

    fn apply_delta(&self, inventory: &mut Inventory) -> Result<(), InventoryError> {
        match &self.delta {
            InventoryDelta::Insert { path, attributes } if inventory.contains(path) => {
                warn!("inventory already lists {path:?}, update it instead");
                inventory.update(path, *attributes)
            }
            InventoryDelta::Insert { path, attributes } => inventory.add(path.clone(), *attributes),
            InventoryDelta::Remove { path } => match inventory.remove(path) {
                Ok(_) => Ok(()),
                Err(InventoryError::Missing { .. }) => {
                    warn!("inventory does not list {path:?}, nothing to remove");
                    Ok(())
                }
                Err(err) => Err(err),
            },
        }
    }
}

/// Friendly result alias :3
type Result<T, E = RepoError> = std::result::Result<T, E>;
