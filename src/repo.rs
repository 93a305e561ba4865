// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Dotfile repository representation.
//!
//! A __dotfile repository__ is a Git repository with a working tree that
//! holds the real content of every tracked dotfile. The home directory only
//! keeps links to that content, so editing a dotfile in place edits the
//! repository, and pulling new history into the repository updates the home
//! directory.
//!
//! # Repository Layout
//!
//! Dotfiles are stored with the leading dot of their first path segment
//! removed, so the working tree does not consist of hidden files. Files at the
//! top-level of the repository that start with a dot belong to the repository
//! itself, e.g., `.gitignore` or the inventory file `.mdots_files`. They are
//! never linked into the home directory.
//!
//! The home directory a repository links into is recorded once, when the
//! repository is created, in `.git/mdots_home`. A Git repository without this
//! record is not a dotfile repository.
//!
//! # See Also
//!
//! 1. [`Dotfile`]
//! 2. [`Inventory`]

mod link;
mod transaction;

pub use link::LinkError;

use crate::{
    dotfile::{Dotfile, InvalidDotfilePath, LinkKind},
    inventory::{
        self, Inventory, InventoryEntry, InventoryError, INVENTORY_FILE, INVENTORY_TMP_FILE,
    },
    repo::transaction::Transaction,
    vcs::{Git2Vcs, PullOutcome, VcsError, VersionControl},
};

use ignore::WalkBuilder;
use std::{
    collections::HashSet,
    fs::{read_dir, symlink_metadata},
    io::ErrorKind,
    path::{absolute, Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// Metadata key of the home directory record.
pub const HOME_RECORD: &str = "mdots_home";

/// Name of the one remote a repository synchronizes with.
pub const REMOTE_NAME: &str = "origin";

/// Dotfile repository.
///
/// Owns the version control handle, the home directory it links into, and
/// the inventory of tracked dotfiles.
#[derive(Debug)]
pub struct DotfileRepo<V = Git2Vcs>
where
    V: VersionControl,
{
    dir: PathBuf,
    home_dir: PathBuf,
    vcs: V,
    inventory: Inventory,
}

impl<V> DotfileRepo<V>
where
    V: VersionControl,
{
    /// Initialize a new dotfile repository.
    ///
    /// Creates an empty repository at `repo_dir` that links into `home_dir`.
    /// No commit is made, and nothing is linked.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::RepositoryExists`] if `repo_dir` is not empty.
    /// - Return [`RepoError::InvalidHomeDir`] if `home_dir` is not a directory,
    ///   or is the same as `repo_dir`.
    /// - Return [`RepoError::Vcs`] if the repository cannot be created.
    #[instrument(skip(repo_dir, home_dir), level = "debug")]
    pub fn init(repo_dir: impl AsRef<Path>, home_dir: impl AsRef<Path>) -> Result<Self> {
        let (dir, home_dir) = check_dirs(repo_dir.as_ref(), home_dir.as_ref())?;
        info!(
            "initialize dotfile repository at {:?} for {:?}",
            dir.display(),
            home_dir.display()
        );
        let vcs = V::try_init(&dir)?;
        let mut repo = Self::setup(dir, home_dir, vcs)?;
        repo.inventory.load()?;

        Ok(repo)
    }

    /// Install dotfile repository from remote.
    ///
    /// Clones `url` into `repo_dir`, and links every dotfile it contains into
    /// `home_dir`, replacing whatever was there before.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::RepositoryExists`] if `repo_dir` is not empty.
    /// - Return [`RepoError::InvalidHomeDir`] if `home_dir` is not a directory,
    ///   or is the same as `repo_dir`.
    /// - Return [`RepoError::Vcs`] if the clone fails.
    /// - Return [`RepoError::Inventory`] if the cloned inventory is malformed.
    #[instrument(skip(url, repo_dir, home_dir), level = "debug")]
    pub fn install(
        url: impl AsRef<str>,
        repo_dir: impl AsRef<Path>,
        home_dir: impl AsRef<Path>,
    ) -> Result<Self> {
        let (dir, home_dir) = check_dirs(repo_dir.as_ref(), home_dir.as_ref())?;
        info!(
            "install dotfile repository {} at {:?} for {:?}",
            url.as_ref(),
            dir.display(),
            home_dir.display()
        );
        let vcs = V::try_clone(url.as_ref(), &dir)?;
        let mut repo = Self::setup(dir, home_dir, vcs)?;
        repo.inventory.load()?;
        let count = repo.install_dotfiles()?;
        info!("linked {count} dotfiles");

        Ok(repo)
    }

    /// Open existing dotfile repository.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::Vcs`] if no Git repository exists at `repo_dir`.
    /// - Return [`RepoError::NotARepository`] if the Git repository has no
    ///   home directory record.
    #[instrument(skip(repo_dir), level = "debug")]
    pub fn open(repo_dir: impl AsRef<Path>) -> Result<Self> {
        let dir = absolute_path(repo_dir.as_ref())?;
        let vcs = V::try_open(&dir)?;
        let home_dir = vcs
            .read_metadata(HOME_RECORD)?
            .map(PathBuf::from)
            .ok_or_else(|| RepoError::NotARepository { path: dir.clone() })?;
        debug!(
            "opened dotfile repository at {:?} for {:?}",
            dir.display(),
            home_dir.display()
        );

        Ok(Self {
            inventory: Inventory::new(&dir),
            dir,
            home_dir,
            vcs,
        })
    }

    fn setup(dir: PathBuf, home_dir: PathBuf, vcs: V) -> Result<Self> {
        vcs.write_metadata(HOME_RECORD, &home_dir.to_string_lossy())?;
        let excluded = format!("/{INVENTORY_TMP_FILE}");
        vcs.exclude(&[excluded.as_str()])?;
        let union_merge = format!("/{INVENTORY_FILE} merge=union");
        vcs.set_attributes(&[union_merge.as_str()])?;

        Ok(Self {
            inventory: Inventory::new(&dir),
            dir,
            home_dir,
            vcs,
        })
    }

    /// Absolute path to root of the repository.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Absolute path to home directory the repository links into.
    pub fn home_dir(&self) -> &Path {
        &self.home_dir
    }

    /// Version control handle of the repository.
    pub fn vcs(&self) -> &V {
        &self.vcs
    }

    /// Inventory of tracked dotfiles, loaded if needed.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::Inventory`] if inventory cannot be loaded.
    pub fn inventory(&mut self) -> Result<&Inventory> {
        self.inventory.ensure_loaded()?;
        Ok(&self.inventory)
    }

    /// Resolve user supplied path into a dotfile of this repository.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::InvalidPath`] if path cannot name a dotfile.
    pub fn resolve(&self, path: impl AsRef<Path>) -> Result<Dotfile> {
        Ok(Dotfile::resolve(path, &self.home_dir, &self.dir)?)
    }

    /// Add dotfile to repository.
    ///
    /// Moves the dotfile into the repository, links it back into the home
    /// directory, records its link kind in the inventory, and commits.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::InvalidPath`] if path cannot name a dotfile.
    /// - Return [`RepoError::Inventory`] if the dotfile's name cannot be
    ///   recorded in the inventory.
    /// - Return [`RepoError::DuplicateDotfile`] if the dotfile is already in
    ///   the repository.
    /// - Return [`RepoError::NotAFile`] if the dotfile is not a regular file.
    /// - Return [`RepoError::Filesystem`] if moving or linking fails.
    #[instrument(skip(self, path), level = "debug")]
    pub fn add(&mut self, path: impl AsRef<Path>, kind: LinkKind) -> Result<Dotfile> {
        let dotfile = self.resolve(path)?;
        inventory::check_path(&dotfile.inventory_key())?;
        if exists(dotfile.repo_path())? {
            return Err(RepoError::DuplicateDotfile { dotfile });
        }

        let metadata = symlink_metadata(dotfile.home_path())
            .map_err(|err| LinkError::new("inspect", dotfile.home_path(), err))?;
        if !metadata.is_file() {
            return Err(RepoError::NotAFile {
                path: dotfile.home_path().to_path_buf(),
            });
        }

        let transaction = Transaction::adopt(dotfile.clone(), kind);
        info!("{} as {kind}", transaction.message());
        transaction.apply(&self.dir, &mut self.inventory, &self.vcs)?;

        Ok(dotfile)
    }

    /// Remove dotfile from repository.
    ///
    /// Drops the link in the home directory, moves the dotfile back in its
    /// place, removes it from the inventory, and commits. A home path that
    /// holds anything but a symlink or hardlink to the repository file is
    /// left alone, and nothing is changed.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::InvalidPath`] if path cannot name a dotfile.
    /// - Return [`RepoError::DotfileNotFound`] if the dotfile is not in the
    ///   repository.
    /// - Return [`RepoError::HomeFileInTheWay`] if the home path holds
    ///   something other than a link to the repository file.
    /// - Return [`RepoError::Filesystem`] if unlinking or moving fails.
    #[instrument(skip(self, path), level = "debug")]
    pub fn remove(&mut self, path: impl AsRef<Path>) -> Result<Dotfile> {
        let dotfile = self.resolve(path)?;
        if !exists(dotfile.repo_path())? {
            return Err(RepoError::DotfileNotFound { dotfile });
        }

        // INVARIANT: Only a link to the repository file may be replaced.
        if exists(dotfile.home_path())?
            && !link::is_link_to(dotfile.home_path(), dotfile.repo_path())?
        {
            return Err(RepoError::HomeFileInTheWay { dotfile });
        }

        let transaction = Transaction::release(dotfile.clone());
        info!("{}", transaction.message());
        transaction.apply(&self.dir, &mut self.inventory, &self.vcs)?;

        Ok(dotfile)
    }

    /// Synchronize repository with its remote.
    ///
    /// If `url` is given, the remote is (re)bound to it first. Pulls the
    /// current branch, pushes it back, makes it track the remote, and
    /// refreshes the home directory: new dotfiles get linked, and symlinks to
    /// dotfiles that disappeared get removed.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::NoRemote`] if no remote is configured and no `url`
    ///   is given.
    /// - Return [`RepoError::UnrelatedRemote`] if the remote shares no history
    ///   with the repository. Nothing is pushed in this case.
    /// - Return [`RepoError::Vcs`] if pulling or pushing fails.
    #[instrument(skip(self, url), level = "debug")]
    pub fn sync(&mut self, url: Option<&str>) -> Result<()> {
        match (url, self.vcs.remote_url(REMOTE_NAME)?) {
            (None, None) => return Err(RepoError::NoRemote),
            (Some(url), Some(existing)) => {
                info!("rebind {REMOTE_NAME} from {existing} to {url}");
                self.vcs.delete_remote(REMOTE_NAME)?;
                self.vcs.create_remote(REMOTE_NAME, url)?;
            }
            (Some(url), None) => self.vcs.create_remote(REMOTE_NAME, url)?,
            (None, Some(existing)) => debug!("sync with {REMOTE_NAME} at {existing}"),
        }

        let branch = self.vcs.current_branch()?;
        let before = self.dotfiles().collect::<Result<HashSet<_>>>()?;

        let outcome = self
            .vcs
            .pull(REMOTE_NAME, &branch)
            .map_err(|err| match err {
                VcsError::UnrelatedHistories { remote, branch } => {
                    RepoError::UnrelatedRemote { remote, branch }
                }
                err => RepoError::Vcs(err),
            })?;
        if outcome == PullOutcome::EmptyRemote {
            info!("{REMOTE_NAME} is empty, nothing to pull");
        }

        self.vcs.push(REMOTE_NAME, &branch)?;
        if !self.vcs.is_unborn()? && self.vcs.remote_tracking_refs(REMOTE_NAME)?.is_empty() {
            return Err(RepoError::UnrelatedRemote {
                remote: REMOTE_NAME.to_string(),
                branch,
            });
        }
        self.vcs.set_tracking_branch(REMOTE_NAME, &branch)?;

        self.inventory.load()?;
        let after = self.dotfiles().collect::<Result<HashSet<_>>>()?;
        self.prune_stale_links(before.difference(&after))?;
        let count = self.install_dotfiles()?;
        info!("synchronized {count} dotfiles with {REMOTE_NAME}/{branch}");

        Ok(())
    }

    /// Iterate over every dotfile in the repository.
    ///
    /// Skips the Git directory, repository files at the top-level that start
    /// with a dot, any file whose name starts with a dot, and anything the
    /// repository ignores. Order is file system order.
    pub fn dotfiles(&self) -> impl Iterator<Item = Result<Dotfile>> + '_ {
        WalkBuilder::new(&self.dir)
            .hidden(false)
            .parents(false)
            .ignore(false)
            .git_global(false)
            .require_git(false)
            .filter_entry(|entry| {
                entry.depth() != 1 || !entry.file_name().to_string_lossy().starts_with('.')
            })
            .build()
            .filter_map(move |entry| {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(err) => return Some(Err(err.into())),
                };

                let is_file = entry.file_type().is_some_and(|kind| kind.is_file());
                if !is_file || entry.file_name().to_string_lossy().starts_with('.') {
                    return None;
                }

                Some(
                    entry
                        .path()
                        .strip_prefix(&self.dir)
                        .map_err(|_| RepoError::NotInRepository {
                            path: entry.path().to_path_buf(),
                        })
                        .and_then(|relative| {
                            Ok(Dotfile::from_repo_relative(
                                relative,
                                &self.home_dir,
                                &self.dir,
                            )?)
                        }),
                )
            })
    }

    /// List tracked dotfiles with the link kind the inventory records.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::Inventory`] if inventory cannot be loaded.
    /// - Return [`RepoError::Walk`] if the repository cannot be traversed.
    pub fn tracked(&mut self) -> Result<Vec<(Dotfile, LinkKind)>> {
        self.inventory.ensure_loaded()?;
        let mut tracked = self
            .dotfiles()
            .map(|dotfile| {
                let dotfile = dotfile?;
                let kind = self.link_kind_of(&dotfile);
                Ok((dotfile, kind))
            })
            .collect::<Result<Vec<_>>>()?;
        tracked.sort_by(|(a, _), (b, _)| a.logical_path().cmp(b.logical_path()));

        Ok(tracked)
    }

    /// Link every dotfile in the repository into the home directory.
    ///
    /// Whatever sits at a dotfile's home path is replaced. Link kinds come
    /// from the inventory, defaulting to symlinks. Returns the number of
    /// dotfiles linked.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::Inventory`] if inventory cannot be loaded.
    /// - Return [`RepoError::Filesystem`] if a link cannot be replaced.
    #[instrument(skip(self), level = "debug")]
    pub fn install_dotfiles(&mut self) -> Result<usize> {
        self.inventory.ensure_loaded()?;

        let mut count = 0;
        for dotfile in self.dotfiles() {
            let dotfile = dotfile?;
            let kind = self.link_kind_of(&dotfile);
            debug!("install {dotfile} as {kind}");
            link::replace_with_link(dotfile.repo_path(), dotfile.home_path(), kind)?;
            count += 1;
        }

        Ok(count)
    }

    fn link_kind_of(&self, dotfile: &Dotfile) -> LinkKind {
        self.inventory
            .get(&dotfile.inventory_key())
            .map(InventoryEntry::link_kind)
            .unwrap_or_default()
    }

    // INVARIANT: Only symlinks into the repository are removed. A hardlink is
    // the last copy of its content once the repository file is gone.
    fn prune_stale_links<'a>(&self, stale: impl Iterator<Item = &'a Dotfile>) -> Result<()> {
        for dotfile in stale {
            let home_path = dotfile.home_path();
            if link::is_symlink_into(home_path, &self.dir) {
                warn!("remove stale link {:?}", home_path.display());
                link::remove_existing(home_path)?;
            } else if exists(home_path)? {
                warn!(
                    "keep {:?}, its dotfile is gone from the repository",
                    home_path.display()
                );
            }
        }

        Ok(())
    }
}

fn check_dirs(repo_dir: &Path, home_dir: &Path) -> Result<(PathBuf, PathBuf)> {
    let dir = absolute_path(repo_dir)?;
    let home_dir = absolute_path(home_dir)?;

    if !home_dir.is_dir() {
        return Err(RepoError::InvalidHomeDir {
            path: home_dir,
            reason: "not an existing directory",
        });
    }

    if home_dir == dir {
        return Err(RepoError::InvalidHomeDir {
            path: home_dir,
            reason: "same as the repository directory",
        });
    }

    match read_dir(&dir) {
        Ok(mut entries) => match entries.next() {
            Some(_) => Err(RepoError::RepositoryExists { path: dir }),
            None => Ok((dir, home_dir)),
        },
        Err(err) if err.kind() == ErrorKind::NotFound => Ok((dir, home_dir)),
        Err(_) if dir.exists() => Err(RepoError::RepositoryExists { path: dir }),
        Err(err) => Err(LinkError::new("read directory", &dir, err).into()),
    }
}

fn absolute_path(path: &Path) -> Result<PathBuf> {
    absolute(path).map_err(|err| LinkError::new("resolve", path, err).into())
}

fn exists(path: &Path) -> Result<bool> {
    match symlink_metadata(path) {
        Ok(_) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(LinkError::new("inspect", path, err).into()),
    }
}

/// Dotfile repository error types.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// Target directory of a new repository is not empty.
    #[error("cannot create repository at {:?}, directory is not empty", path.display())]
    RepositoryExists { path: PathBuf },

    /// Home directory cannot be linked into.
    #[error("invalid home directory {:?}: {reason}", path.display())]
    InvalidHomeDir { path: PathBuf, reason: &'static str },

    /// Git repository without home directory record.
    #[error("{:?} is not a moredots repository", path.display())]
    NotARepository { path: PathBuf },

    /// Dotfile is already tracked.
    #[error("{dotfile} is already in the repository")]
    DuplicateDotfile { dotfile: Dotfile },

    /// Dotfile is not tracked.
    #[error("{dotfile} is not in the repository")]
    DotfileNotFound { dotfile: Dotfile },

    /// Home path of a dotfile holds a file that is not linked to it.
    #[error("{dotfile} in the home directory is not linked to the repository, move it away first")]
    HomeFileInTheWay { dotfile: Dotfile },

    /// Only regular files can be added.
    #[error("{:?} is not a regular file", path.display())]
    NotAFile { path: PathBuf },

    /// Walked path does not lie in the repository.
    #[error("{:?} is outside of the repository", path.display())]
    NotInRepository { path: PathBuf },

    /// No remote to synchronize with.
    #[error("no remote configured, give a URL to synchronize with")]
    NoRemote,

    /// Remote shares no history with the repository.
    #[error("{remote}/{branch} shares no history with this repository")]
    UnrelatedRemote { remote: String, branch: String },

    /// File system operation fails.
    #[error(transparent)]
    Filesystem(#[from] LinkError),

    /// Path cannot name a dotfile.
    #[error(transparent)]
    InvalidPath(#[from] InvalidDotfilePath),

    /// Inventory cannot be loaded, parsed, or saved.
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    /// Version control operation fails.
    #[error(transparent)]
    Vcs(#[from] VcsError),

    /// Repository cannot be traversed.
    #[error(transparent)]
    Walk(#[from] ignore::Error),
}

/// Friendly result alias :3
pub type Result<T, E = RepoError> = std::result::Result<T, E>;
