// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{
    commit_messages, commit_workdir_file, head_of, make_dir, write_file, RepoFixture, RepoKind,
};

use anyhow::Result;
use git2::Repository;
use moredots::{DotfileRepo, Git2Vcs, LinkKind, RepoError, VersionControl};
use pretty_assertions::assert_eq;
use sealed_test::prelude::*;
use std::fs::{read_link, read_to_string, symlink_metadata};

fn tracking_remote(repo: &DotfileRepo) -> Result<Option<String>> {
    let branch = repo.vcs().current_branch()?;
    let config = Repository::open(repo.dir())?.config()?.snapshot()?;
    Ok(config
        .get_string(&format!("branch.{branch}.remote"))
        .ok())
}

#[sealed_test]
fn sync_without_remote_fails() -> Result<()> {
    let home = make_dir("home")?;
    let mut repo = DotfileRepo::<Git2Vcs>::init("repo", &home)?;

    let result = repo.sync(None);
    assert!(matches!(result, Err(RepoError::NoRemote)));

    Ok(())
}

#[sealed_test]
fn sync_empty_local_with_empty_remote() -> Result<()> {
    let remote = RepoFixture::new("remote.git", RepoKind::Bare)?;
    let home = make_dir("home")?;
    let mut repo = DotfileRepo::<Git2Vcs>::init("repo", &home)?;

    repo.sync(Some(&remote.url()))?;
    assert_eq!(remote.head(), None);
    assert!(repo.vcs().is_unborn()?);
    assert_eq!(tracking_remote(&repo)?.as_deref(), Some("origin"));

    Ok(())
}

#[sealed_test]
fn sync_filled_local_with_empty_remote() -> Result<()> {
    let remote = RepoFixture::new("remote.git", RepoKind::Bare)?;
    let home = make_dir("home")?;
    let mut repo = DotfileRepo::<Git2Vcs>::init("repo", &home)?;
    write_file(home.join(".bashrc"), "set -o vi\n")?;
    write_file(home.join(".vimrc"), "set number\n")?;
    repo.add(home.join(".bashrc"), LinkKind::Symlink)?;
    repo.add(home.join(".vimrc"), LinkKind::Hardlink)?;
    let inventory = repo.inventory()?.to_string();

    repo.sync(Some(&remote.url()))?;
    assert_eq!(remote.head(), Some(head_of(repo.dir())?));
    assert_eq!(repo.dotfiles().count(), 2);
    assert_eq!(repo.inventory()?.to_string(), inventory);
    assert_eq!(commit_messages(repo.dir())?.len(), 2);
    assert_eq!(tracking_remote(&repo)?.as_deref(), Some("origin"));
    assert_eq!(read_link(home.join(".bashrc"))?, repo.dir().join("bashrc"));

    Ok(())
}

#[sealed_test]
fn sync_empty_local_with_filled_remote() -> Result<()> {
    let remote = RepoFixture::filled("remote.git")?;
    let home = make_dir("home")?;
    let mut repo = DotfileRepo::<Git2Vcs>::init("repo", &home)?;

    repo.sync(Some(&remote.url()))?;
    assert_eq!(remote.head(), Some(head_of(repo.dir())?));
    assert_eq!(read_link(home.join(".bashrc"))?, repo.dir().join("bashrc"));
    assert_eq!(
        read_link(home.join(".config/nvim/init.lua"))?,
        repo.dir().join("config/nvim/init.lua")
    );
    assert!(!symlink_metadata(home.join(".gitconfig"))?.file_type().is_symlink());
    assert_eq!(repo.inventory()?.len(), 3);

    Ok(())
}

#[sealed_test]
fn sync_rejects_unrelated_remote_before_push() -> Result<()> {
    let remote = RepoFixture::filled("remote.git")?;
    let remote_head = remote.head();
    let home = make_dir("home")?;
    let mut repo = DotfileRepo::<Git2Vcs>::init("repo", &home)?;
    write_file(home.join(".vimrc"), "set number\n")?;
    repo.add(home.join(".vimrc"), LinkKind::Symlink)?;

    let result = repo.sync(Some(&remote.url()));
    assert!(matches!(result, Err(RepoError::UnrelatedRemote { .. })));
    assert_eq!(remote.head(), remote_head);
    assert!(!home.join(".bashrc").exists());

    Ok(())
}

#[sealed_test]
fn sync_with_new_url_rebinds_remote() -> Result<()> {
    let old = RepoFixture::new("old.git", RepoKind::Bare)?;
    let new = RepoFixture::new("new.git", RepoKind::Bare)?;
    let home = make_dir("home")?;
    let mut repo = DotfileRepo::<Git2Vcs>::init("repo", &home)?;
    write_file(home.join(".bashrc"), "set -o vi\n")?;
    repo.add(home.join(".bashrc"), LinkKind::Symlink)?;

    repo.sync(Some(&old.url()))?;
    repo.sync(Some(&new.url()))?;
    assert_eq!(repo.vcs().remote_url("origin")?, Some(new.url()));
    assert_eq!(new.head(), Some(head_of(repo.dir())?));

    Ok(())
}

#[sealed_test]
fn resync_links_new_dotfiles_and_prunes_stale_links() -> Result<()> {
    let remote = RepoFixture::new("remote.git", RepoKind::Bare)?;

    let home_a = make_dir("home_a")?;
    let mut repo_a = DotfileRepo::<Git2Vcs>::init("repo_a", &home_a)?;
    write_file(home_a.join(".bashrc"), "set -o vi\n")?;
    write_file(home_a.join(".vimrc"), "set number\n")?;
    repo_a.add(home_a.join(".bashrc"), LinkKind::Symlink)?;
    repo_a.add(home_a.join(".vimrc"), LinkKind::Symlink)?;
    repo_a.sync(Some(&remote.url()))?;

    let home_b = make_dir("home_b")?;
    let mut repo_b = DotfileRepo::<Git2Vcs>::install(remote.url(), "repo_b", &home_b)?;
    assert_eq!(read_link(home_b.join(".vimrc"))?, repo_b.dir().join("vimrc"));

    repo_a.remove(home_a.join(".vimrc"))?;
    write_file(home_a.join(".profile"), "umask 022\n")?;
    repo_a.add(home_a.join(".profile"), LinkKind::Symlink)?;
    repo_a.sync(None)?;

    repo_b.sync(None)?;
    assert!(symlink_metadata(home_b.join(".vimrc")).is_err());
    assert!(!repo_b.dir().join("vimrc").exists());
    assert_eq!(read_link(home_b.join(".profile"))?, repo_b.dir().join("profile"));
    assert_eq!(read_to_string(home_b.join(".profile"))?, "umask 022\n");
    assert!(!repo_b.inventory()?.contains("vimrc"));
    assert!(repo_b.inventory()?.contains("profile"));
    assert_eq!(head_of(repo_b.dir())?, head_of(repo_a.dir())?);

    Ok(())
}

#[sealed_test]
fn sync_merges_diverged_history() -> Result<()> {
    let remote = RepoFixture::new("remote.git", RepoKind::Bare)?;

    let home_a = make_dir("home_a")?;
    let mut repo_a = DotfileRepo::<Git2Vcs>::init("repo_a", &home_a)?;
    write_file(home_a.join(".bashrc"), "set -o vi\n")?;
    repo_a.add(home_a.join(".bashrc"), LinkKind::Symlink)?;
    repo_a.sync(Some(&remote.url()))?;

    let home_b = make_dir("home_b")?;
    let mut repo_b = DotfileRepo::<Git2Vcs>::install(remote.url(), "repo_b", &home_b)?;

    write_file(home_a.join(".profile"), "umask 022\n")?;
    repo_a.add(home_a.join(".profile"), LinkKind::Symlink)?;
    repo_a.sync(None)?;

    // Edit through the home link, which writes into the repository.
    write_file(home_b.join(".bashrc"), "set -o emacs\n")?;
    commit_workdir_file(repo_b.dir(), "bashrc", "tweak bashrc")?;

    repo_b.sync(None)?;
    let git = Repository::open(repo_b.dir())?;
    let head = git.head()?.peel_to_commit()?;
    assert_eq!(head.parent_count(), 2);
    assert_eq!(remote.head(), Some(head.id()));
    assert_eq!(read_to_string(home_b.join(".bashrc"))?, "set -o emacs\n");
    assert_eq!(read_link(home_b.join(".profile"))?, repo_b.dir().join("profile"));
    assert!(repo_b.inventory()?.contains("profile"));

    Ok(())
}

#[sealed_test]
fn resync_keeps_hardlinked_dotfile_removed_elsewhere() -> Result<()> {
    let remote = RepoFixture::new("remote.git", RepoKind::Bare)?;

    let home_a = make_dir("home_a")?;
    let mut repo_a = DotfileRepo::<Git2Vcs>::init("repo_a", &home_a)?;
    write_file(home_a.join(".bashrc"), "set -o vi\n")?;
    write_file(home_a.join(".gitconfig"), "[user]\n\tname = John Doe\n")?;
    repo_a.add(home_a.join(".bashrc"), LinkKind::Symlink)?;
    repo_a.add(home_a.join(".gitconfig"), LinkKind::Hardlink)?;
    repo_a.sync(Some(&remote.url()))?;

    let home_b = make_dir("home_b")?;
    let mut repo_b = DotfileRepo::<Git2Vcs>::install(remote.url(), "repo_b", &home_b)?;
    assert!(!symlink_metadata(home_b.join(".gitconfig"))?.file_type().is_symlink());

    repo_a.remove(home_a.join(".gitconfig"))?;
    repo_a.sync(None)?;

    repo_b.sync(None)?;
    assert!(!repo_b.dir().join("gitconfig").exists());
    let in_home = symlink_metadata(home_b.join(".gitconfig"))?;
    assert!(in_home.file_type().is_file());
    assert_eq!(
        read_to_string(home_b.join(".gitconfig"))?,
        "[user]\n\tname = John Doe\n"
    );
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        assert_eq!(in_home.nlink(), 1);
    }
    assert!(!repo_b.inventory()?.contains("gitconfig"));
    assert_eq!(read_link(home_b.join(".bashrc"))?, repo_b.dir().join("bashrc"));

    Ok(())
}
