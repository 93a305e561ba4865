// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Version control engine.
//!
//! The dotfile repository delegates all history keeping to an external
//! version control engine. [`VersionControl`] is the seam between the two: it
//! names every operation the repository needs, i.e., creating and opening
//! repositories, staging and committing, a single remote to pull from and push
//! to, and a small key-value store for metadata that must never become part of
//! the tracked working tree.
//!
//! [`Git2Vcs`] is the libgit2 implementation. Network operations report
//! transfer progress through a progress bar, and prompt the user for any
//! credentials Git cannot find on its own.

use auth_git2::{GitAuthenticator, Prompter};
use git2::{
    build::{CheckoutBuilder, RepoBuilder},
    Commit, Config, ErrorCode, FetchOptions, PushOptions, RemoteCallbacks, Repository,
    Signature,
};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::{Password, Text};
use std::{
    cell::RefCell,
    fmt::{Debug, Formatter, Result as FmtResult},
    fs::{read_to_string, write, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    time::{Duration, Instant},
};
use tracing::{debug, info, instrument, warn};

/// Result of integrating a remote branch into the local one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    /// Remote has no history for the branch yet.
    EmptyRemote,

    /// Local branch already contains the remote branch.
    UpToDate,

    /// Local branch was moved forward onto the remote branch.
    FastForward,

    /// Local and remote history were joined by a merge commit.
    Merged,
}

/// Layer of indirection for version control access.
pub trait VersionControl: Sized {
    /// Initialize a new repository with a working tree.
    fn try_init(path: impl AsRef<Path>) -> Result<Self>;

    /// Open existing repository.
    fn try_open(path: impl AsRef<Path>) -> Result<Self>;

    /// Clone existing repository from remote URL.
    fn try_clone(url: impl AsRef<str>, path: impl AsRef<Path>) -> Result<Self>;

    /// Read metadata value stored outside of the working tree.
    fn read_metadata(&self, key: &str) -> Result<Option<String>>;

    /// Write metadata value outside of the working tree.
    fn write_metadata(&self, key: &str, value: &str) -> Result<()>;

    /// Add patterns to the untracked ignore list of the repository.
    fn exclude(&self, patterns: &[&str]) -> Result<()>;

    /// Add lines to the untracked attribute list of the repository.
    fn set_attributes(&self, lines: &[&str]) -> Result<()>;

    /// Name of branch currently checked out.
    fn current_branch(&self) -> Result<String>;

    /// Check if the current branch has no commits yet.
    fn is_unborn(&self) -> Result<bool>;

    /// URL of remote by name, if it exists.
    fn remote_url(&self, name: &str) -> Result<Option<String>>;

    /// Create remote with name pointing at URL.
    fn create_remote(&self, name: &str, url: &str) -> Result<()>;

    /// Delete remote by name.
    fn delete_remote(&self, name: &str) -> Result<()>;

    /// Fetch branch from remote and integrate it into the local branch.
    fn pull(&self, remote: &str, branch: &str) -> Result<PullOutcome>;

    /// Push local branch to remote.
    fn push(&self, remote: &str, branch: &str) -> Result<()>;

    /// Names of all remote-tracking references for remote.
    fn remote_tracking_refs(&self, remote: &str) -> Result<Vec<String>>;

    /// Make local branch track the same branch on remote.
    fn set_tracking_branch(&self, remote: &str, branch: &str) -> Result<()>;

    /// Stage paths relative to the repository root.
    fn stage(&self, paths: impl IntoIterator<Item = impl AsRef<Path>>) -> Result<()>;

    /// Remove paths relative to the repository root from the index.
    fn unstage(&self, paths: impl IntoIterator<Item = impl AsRef<Path>>) -> Result<()>;

    /// Commit the index onto the current branch.
    fn commit(&self, message: &str) -> Result<()>;
}

/// Version control through libgit2.
pub struct Git2Vcs {
    repository: Repository,
}

impl Git2Vcs {
    fn info_file(&self, name: &str) -> PathBuf {
        self.repository.path().join("info").join(name)
    }

    fn append_unique_lines(&self, path: &Path, lines: &[&str]) -> Result<()> {
        let content = match read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => String::new(),
            Err(err) => {
                return Err(VcsError::Metadata {
                    source: err,
                    path: path.to_path_buf(),
                })
            }
        };

        let missing = lines
            .iter()
            .filter(|line| !content.lines().any(|existing| existing == **line))
            .collect::<Vec<_>>();
        if missing.is_empty() {
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            mkdirp::mkdirp(parent).map_err(|err| VcsError::Metadata {
                source: err,
                path: parent.to_path_buf(),
            })?;
        }

        let mut out = String::new();
        if !content.is_empty() && !content.ends_with('\n') {
            out.push('\n');
        }
        for line in missing {
            debug!("append {line:?} to {:?}", path.display());
            out.push_str(line);
            out.push('\n');
        }

        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| file.write_all(out.as_bytes()))
            .map_err(|err| VcsError::Metadata {
                source: err,
                path: path.to_path_buf(),
            })
    }

    fn signature(&self) -> Result<Signature<'static>> {
        match self.repository.signature() {
            Ok(signature) => Ok(signature),
            Err(err) if err.code() == ErrorCode::NotFound => {
                debug!("no git identity configured, use fallback signature");
                Ok(Signature::now("moredots", "moredots@localhost")?)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn head_commit(&self) -> Result<Option<Commit<'_>>> {
        match self.repository.head() {
            Ok(head) => Ok(Some(head.peel_to_commit()?)),
            Err(err) if is_unborn_error(&err) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn fast_forward(&self, branch: &str, target: &Commit<'_>) -> Result<()> {
        info!("fast-forward {branch} to {}", target.id());
        let mut checkout = CheckoutBuilder::new();
        checkout.safe();
        self.repository
            .checkout_tree(target.as_object(), Some(&mut checkout))?;
        self.repository.reference(
            &format!("refs/heads/{branch}"),
            target.id(),
            true,
            &format!("[moredots] fast-forward to {}", target.id()),
        )?;

        Ok(())
    }

    fn merge(&self, local: &Commit<'_>, remote: &Commit<'_>, remote_name: &str) -> Result<()> {
        info!("merge {} into {}", remote.id(), local.id());
        let mut index = self.repository.merge_commits(local, remote, None)?;
        if index.has_conflicts() {
            let paths = index
                .conflicts()?
                .filter_map(|conflict| conflict.ok())
                .filter_map(|conflict| conflict.our.or(conflict.their))
                .map(|entry| String::from_utf8_lossy(&entry.path).into_owned())
                .collect::<Vec<_>>();
            return Err(VcsError::MergeConflict { paths });
        }

        let tree_id = index.write_tree_to(&self.repository)?;
        let tree = self.repository.find_tree(tree_id)?;
        let mut checkout = CheckoutBuilder::new();
        checkout.safe();
        self.repository
            .checkout_tree(tree.as_object(), Some(&mut checkout))?;

        let signature = self.signature()?;
        let message = format!("[moredots] Merge {remote_name}");
        self.repository.commit(
            Some("HEAD"),
            &signature,
            &signature,
            &message,
            &tree,
            &[local, remote],
        )?;

        Ok(())
    }
}

impl VersionControl for Git2Vcs {
    #[instrument(skip(path), level = "debug")]
    fn try_init(path: impl AsRef<Path>) -> Result<Self> {
        info!("initialize git repository at {:?}", path.as_ref().display());
        let repository = Repository::init(path.as_ref())?;
        Ok(Self { repository })
    }

    #[instrument(skip(path), level = "debug")]
    fn try_open(path: impl AsRef<Path>) -> Result<Self> {
        debug!("open git repository at {:?}", path.as_ref().display());
        let repository = Repository::open(path.as_ref())?;
        if repository.is_bare() {
            return Err(VcsError::Bare {
                path: path.as_ref().to_path_buf(),
            });
        }

        Ok(Self { repository })
    }

    /// Clone existing repository from remote URL.
    ///
    /// The progress of the clone is displayed through a progress bar. If any
    /// credentials are required, then the user will be prompted for them, and
    /// the progress bar will be suspended for user input.
    ///
    /// # Errors
    ///
    /// - Return [`VcsError::Git2`] if libgit2 operations fail.
    /// - Return [`VcsError::ProgressTemplate`] if the progress bar cannot be
    ///   styled.
    #[instrument(skip(url, path), level = "debug")]
    fn try_clone(url: impl AsRef<str>, path: impl AsRef<Path>) -> Result<Self> {
        info!("clone {} into {:?}", url.as_ref(), path.as_ref().display());
        let bar = progress_bar(url.as_ref())?;
        let authenticator =
            GitAuthenticator::default().set_prompter(IndicatifPrompter::new(bar.clone()));
        let config = Config::open_default()?;

        let mut fo = FetchOptions::new();
        fo.remote_callbacks(remote_callbacks(&authenticator, &config, &bar));
        let repository = RepoBuilder::new()
            .fetch_options(fo)
            .clone(url.as_ref(), path.as_ref());
        bar.finish_and_clear();

        Ok(Self {
            repository: repository?,
        })
    }

    fn read_metadata(&self, key: &str) -> Result<Option<String>> {
        let path = self.repository.path().join(key);
        match read_to_string(&path) {
            Ok(value) => Ok(Some(value.trim_end_matches(['\r', '\n']).to_string())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(VcsError::Metadata { source: err, path }),
        }
    }

    fn write_metadata(&self, key: &str, value: &str) -> Result<()> {
        let path = self.repository.path().join(key);
        debug!("write metadata {key:?} to {:?}", path.display());
        write(&path, format!("{value}\n")).map_err(|err| VcsError::Metadata { source: err, path })
    }

    fn exclude(&self, patterns: &[&str]) -> Result<()> {
        self.append_unique_lines(&self.info_file("exclude"), patterns)
    }

    fn set_attributes(&self, lines: &[&str]) -> Result<()> {
        self.append_unique_lines(&self.info_file("attributes"), lines)
    }

    fn current_branch(&self) -> Result<String> {
        let head = self.repository.find_reference("HEAD")?;
        let target = head.symbolic_target().ok_or(VcsError::DetachedHead)?;
        Ok(target
            .strip_prefix("refs/heads/")
            .unwrap_or(target)
            .to_string())
    }

    fn is_unborn(&self) -> Result<bool> {
        Ok(self.head_commit()?.is_none())
    }

    fn remote_url(&self, name: &str) -> Result<Option<String>> {
        match self.repository.find_remote(name) {
            Ok(remote) => Ok(remote.url().map(str::to_owned)),
            Err(err) if err.code() == ErrorCode::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn create_remote(&self, name: &str, url: &str) -> Result<()> {
        info!("create remote {name} at {url}");
        self.repository.remote(name, url)?;
        Ok(())
    }

    fn delete_remote(&self, name: &str) -> Result<()> {
        info!("delete remote {name}");
        self.repository.remote_delete(name)?;
        Ok(())
    }

    /// Fetch branch from remote and integrate it into the local branch.
    ///
    /// Integration follows the shape of both histories:
    ///
    /// - No remote branch: nothing to integrate.
    /// - Unborn local branch: take the remote branch as is.
    /// - Remote branch already contained: nothing to integrate.
    /// - Local branch behind: fast-forward.
    /// - Both sides moved: create a merge commit.
    ///
    /// # Errors
    ///
    /// - Return [`VcsError::UnrelatedHistories`] if both branches have commits
    ///   but no common ancestor.
    /// - Return [`VcsError::MergeConflict`] if the merge cannot be done
    ///   cleanly.
    /// - Return [`VcsError::Git2`] if libgit2 operations fail.
    #[instrument(skip(self), level = "debug")]
    fn pull(&self, remote: &str, branch: &str) -> Result<PullOutcome> {
        info!("pull {branch} from {remote}");
        let mut remote_handle = self.repository.find_remote(remote)?;
        let bar = progress_bar(&format!("fetch {remote}"))?;
        let authenticator =
            GitAuthenticator::default().set_prompter(IndicatifPrompter::new(bar.clone()));
        let config = self.repository.config()?;

        let mut fo = FetchOptions::new();
        fo.remote_callbacks(remote_callbacks(&authenticator, &config, &bar));
        let fetched = remote_handle.fetch(&[] as &[&str], Some(&mut fo), None);
        bar.finish_and_clear();
        fetched?;

        let remote_ref = format!("refs/remotes/{remote}/{branch}");
        let remote_commit = match self.repository.find_reference(&remote_ref) {
            Ok(reference) => reference.peel_to_commit()?,
            Err(err) if err.code() == ErrorCode::NotFound => {
                warn!("remote {remote} has no history for {branch}");
                return Ok(PullOutcome::EmptyRemote);
            }
            Err(err) => return Err(err.into()),
        };

        let Some(local_commit) = self.head_commit()? else {
            self.fast_forward(branch, &remote_commit)?;
            return Ok(PullOutcome::FastForward);
        };

        // INVARIANT: Refuse to join histories that share nothing.
        match self
            .repository
            .merge_base(local_commit.id(), remote_commit.id())
        {
            Ok(_) => {}
            Err(err) if err.code() == ErrorCode::NotFound => {
                return Err(VcsError::UnrelatedHistories {
                    remote: remote.to_string(),
                    branch: branch.to_string(),
                })
            }
            Err(err) => return Err(err.into()),
        }

        let annotated = self.repository.find_annotated_commit(remote_commit.id())?;
        let (analysis, _) = self.repository.merge_analysis(&[&annotated])?;
        if analysis.is_up_to_date() {
            debug!("{branch} is up to date with {remote}");
            return Ok(PullOutcome::UpToDate);
        }

        if analysis.is_fast_forward() {
            self.fast_forward(branch, &remote_commit)?;
            return Ok(PullOutcome::FastForward);
        }

        self.merge(&local_commit, &remote_commit, &remote_ref)?;
        Ok(PullOutcome::Merged)
    }

    #[instrument(skip(self), level = "debug")]
    fn push(&self, remote: &str, branch: &str) -> Result<()> {
        let Some(head) = self.head_commit()? else {
            warn!("{branch} has no commits, nothing to push");
            return Ok(());
        };

        info!("push {branch} to {remote}");
        let mut remote_handle = self.repository.find_remote(remote)?;
        let bar = progress_bar(&format!("push {remote}"))?;
        let authenticator =
            GitAuthenticator::default().set_prompter(IndicatifPrompter::new(bar.clone()));
        let config = self.repository.config()?;
        let refspec = format!("refs/heads/{branch}:refs/heads/{branch}");

        let rejected = RefCell::new(Vec::new());
        let pushed = {
            let mut rc = remote_callbacks(&authenticator, &config, &bar);
            rc.push_update_reference(|refname, status| {
                if let Some(status) = status {
                    rejected.borrow_mut().push(format!("{refname}: {status}"));
                }
                Ok(())
            });

            let mut po = PushOptions::new();
            po.remote_callbacks(rc);
            remote_handle.push(&[refspec.as_str()], Some(&mut po))
        };
        bar.finish_and_clear();
        pushed?;

        let rejected = rejected.into_inner();
        if !rejected.is_empty() {
            return Err(VcsError::PushRejected {
                remote: remote.to_string(),
                reasons: rejected.join(", "),
            });
        }

        self.repository.reference(
            &format!("refs/remotes/{remote}/{branch}"),
            head.id(),
            true,
            "[moredots] update remote-tracking reference after push",
        )?;

        Ok(())
    }

    fn remote_tracking_refs(&self, remote: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for reference in self
            .repository
            .references_glob(&format!("refs/remotes/{remote}/*"))?
        {
            if let Some(name) = reference?.name() {
                names.push(name.to_string());
            }
        }

        Ok(names)
    }

    fn set_tracking_branch(&self, remote: &str, branch: &str) -> Result<()> {
        debug!("track {remote}/{branch}");
        let mut config = self.repository.config()?;
        config.set_str(&format!("branch.{branch}.remote"), remote)?;
        config.set_str(
            &format!("branch.{branch}.merge"),
            &format!("refs/heads/{branch}"),
        )?;

        Ok(())
    }

    fn stage(&self, paths: impl IntoIterator<Item = impl AsRef<Path>>) -> Result<()> {
        let mut index = self.repository.index()?;
        for path in paths {
            debug!("stage {:?}", path.as_ref().display());
            index.add_path(path.as_ref())?;
        }
        index.write()?;

        Ok(())
    }

    fn unstage(&self, paths: impl IntoIterator<Item = impl AsRef<Path>>) -> Result<()> {
        let mut index = self.repository.index()?;
        for path in paths {
            debug!("unstage {:?}", path.as_ref().display());
            index.remove_path(path.as_ref())?;
        }
        index.write()?;

        Ok(())
    }

    fn commit(&self, message: &str) -> Result<()> {
        let signature = self.signature()?;
        let mut index = self.repository.index()?;
        let tree = self.repository.find_tree(index.write_tree()?)?;
        let parent = self.head_commit()?;
        let parents = parent.iter().collect::<Vec<_>>();

        let id = self.repository.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &parents,
        )?;
        info!("commit {id}: {message}");

        Ok(())
    }
}

impl Debug for Git2Vcs {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.debug_struct("Git2Vcs")
            .field("gitdir", &self.repository.path())
            .finish()
    }
}

fn is_unborn_error(err: &git2::Error) -> bool {
    matches!(err.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound)
}

fn progress_bar(message: &str) -> Result<ProgressBar> {
    let style =
        ProgressStyle::with_template("{elapsed_precise:.green}  {msg:<50}  [{wide_bar:.yellow/blue}]")?
            .progress_chars("-Cco.");
    let bar = ProgressBar::new(0);
    bar.set_style(style);
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(100));

    Ok(bar)
}

fn remote_callbacks<'a>(
    authenticator: &'a GitAuthenticator,
    config: &'a Config,
    bar: &ProgressBar,
) -> RemoteCallbacks<'a> {
    let mut rc = RemoteCallbacks::new();
    rc.credentials(authenticator.credentials(config));

    let fetch_bar = bar.clone();
    let mut throttle = Instant::now();
    rc.transfer_progress(move |progress| {
        if throttle.elapsed() > Duration::from_millis(10) {
            throttle = Instant::now();
            fetch_bar.set_length(progress.total_objects() as u64);
            fetch_bar.set_position(progress.received_objects() as u64);
        }
        true
    });

    let push_bar = bar.clone();
    rc.push_transfer_progress(move |current, total, _| {
        push_bar.set_length(total as u64);
        push_bar.set_position(current as u64);
    });

    rc
}

/// Git2 authentication prompter for progress bar.
#[derive(Debug, Clone)]
pub struct IndicatifPrompter {
    bar: ProgressBar,
}

impl IndicatifPrompter {
    /// Construct new progress bar authenticator.
    pub fn new(bar: ProgressBar) -> Self {
        Self { bar }
    }
}

impl Prompter for IndicatifPrompter {
    #[instrument(skip(self, url, _config), level = "debug")]
    fn prompt_username_password(
        &mut self,
        url: &str,
        _config: &git2::Config,
    ) -> Option<(String, String)> {
        info!("authentication required at {url}");
        self.bar.suspend(|| -> Option<(String, String)> {
            let username = Text::new("username").prompt().ok()?;
            let password = Password::new("password")
                .without_confirmation()
                .prompt()
                .ok()?;
            Some((username, password))
        })
    }

    #[instrument(skip(self, username, url, _config), level = "debug")]
    fn prompt_password(
        &mut self,
        username: &str,
        url: &str,
        _config: &git2::Config,
    ) -> Option<String> {
        info!("authentication required at {url} for user {username}");
        self.bar.suspend(|| -> Option<String> {
            Password::new("password")
                .without_confirmation()
                .prompt()
                .ok()
        })
    }

    #[instrument(skip(self, ssh_key_path, _config), level = "debug")]
    fn prompt_ssh_key_passphrase(
        &mut self,
        ssh_key_path: &Path,
        _config: &git2::Config,
    ) -> Option<String> {
        info!(
            "authentication required with ssh key at {}",
            ssh_key_path.display()
        );
        self.bar.suspend(|| -> Option<String> {
            Password::new("passphrase")
                .without_confirmation()
                .prompt()
                .ok()
        })
    }
}

/// Version control error types.
#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),

    /// Repository has no working tree.
    #[error("repository at {:?} is bare", path.display())]
    Bare { path: PathBuf },

    /// HEAD does not point at a branch.
    #[error("HEAD is detached, check out a branch first")]
    DetachedHead,

    /// Local and remote branch share no history.
    #[error("{remote}/{branch} shares no history with the local branch")]
    UnrelatedHistories { remote: String, branch: String },

    /// Merge produced conflicts.
    #[error("merge conflict in {}", paths.join(", "))]
    MergeConflict { paths: Vec<String> },

    /// Remote refused the pushed references.
    #[error("push to {remote} rejected: {reasons}")]
    PushRejected { remote: String, reasons: String },

    /// Metadata outside of the working tree cannot be accessed.
    #[error("failed to access repository metadata at {:?}", path.display())]
    Metadata {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Style template cannot be set for progress bars.
    #[error(transparent)]
    ProgressTemplate(#[from] indicatif::style::TemplateError),
}

/// Friendly result alias :3
pub type Result<T, E = VcsError> = std::result::Result<T, E>;
