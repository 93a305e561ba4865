// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{commit_messages, make_dir, write_file, RepoFixture, RepoKind};

use anyhow::Result;
use moredots::{DotfileRepo, Git2Vcs, RepoError, VersionControl};
use pretty_assertions::assert_eq;
use sealed_test::prelude::*;
use std::{env::current_dir, fs::read_to_string};

#[sealed_test]
fn init_creates_empty_repository() -> Result<()> {
    let home = make_dir("home")?;
    let dir = current_dir()?.join("repo");

    let mut repo = DotfileRepo::<Git2Vcs>::init(&dir, &home)?;
    assert_eq!(repo.dir(), dir);
    assert_eq!(repo.home_dir(), home);
    assert!(repo.vcs().is_unborn()?);
    assert!(repo.inventory()?.is_empty());
    assert!(commit_messages(&dir)?.is_empty());

    let record = read_to_string(dir.join(".git/mdots_home"))?;
    assert_eq!(record.trim_end(), home.to_string_lossy());
    let exclude = read_to_string(dir.join(".git/info/exclude"))?;
    assert!(exclude.lines().any(|line| line == "/.mdots_files.tmp"));

    Ok(())
}

#[sealed_test]
fn init_accepts_existing_empty_directory() -> Result<()> {
    let home = make_dir("home")?;
    let dir = make_dir("repo")?;

    let repo = DotfileRepo::<Git2Vcs>::init(&dir, &home)?;
    assert_eq!(repo.dir(), dir);

    Ok(())
}

#[sealed_test]
fn init_rejects_non_empty_directory() -> Result<()> {
    let home = make_dir("home")?;
    write_file("repo/notes.txt", "keep me\n")?;

    let result = DotfileRepo::<Git2Vcs>::init("repo", &home);
    assert!(matches!(result, Err(RepoError::RepositoryExists { .. })));
    assert_eq!(read_to_string("repo/notes.txt")?, "keep me\n");

    Ok(())
}

#[sealed_test]
fn init_rejects_invalid_home_directory() -> Result<()> {
    let result = DotfileRepo::<Git2Vcs>::init("repo", "missing");
    assert!(matches!(result, Err(RepoError::InvalidHomeDir { .. })));

    write_file("file", "")?;
    let result = DotfileRepo::<Git2Vcs>::init("repo", "file");
    assert!(matches!(result, Err(RepoError::InvalidHomeDir { .. })));

    let home = make_dir("home")?;
    let result = DotfileRepo::<Git2Vcs>::init(&home, &home);
    assert!(matches!(result, Err(RepoError::InvalidHomeDir { .. })));

    Ok(())
}

#[sealed_test]
fn open_reads_home_record() -> Result<()> {
    let home = make_dir("home")?;
    DotfileRepo::<Git2Vcs>::init("repo", &home)?;

    let repo = DotfileRepo::<Git2Vcs>::open("repo")?;
    assert_eq!(repo.home_dir(), home);
    assert_eq!(repo.dir(), current_dir()?.join("repo"));

    Ok(())
}

#[sealed_test]
fn open_rejects_plain_git_repository() -> Result<()> {
    RepoFixture::new("plain", RepoKind::Normal)?;

    let result = DotfileRepo::<Git2Vcs>::open("plain");
    assert!(matches!(result, Err(RepoError::NotARepository { .. })));

    Ok(())
}

#[sealed_test]
fn open_rejects_missing_repository() -> Result<()> {
    let result = DotfileRepo::<Git2Vcs>::open("missing");
    assert!(matches!(result, Err(RepoError::Vcs(..))));

    Ok(())
}
