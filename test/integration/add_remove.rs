// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{commit_messages, make_dir, write_file};

use anyhow::Result;
use moredots::{
    inventory::InventoryError, DotfileRepo, Git2Vcs, InventoryEntry, LinkKind, RepoError,
};
use pretty_assertions::assert_eq;
use sealed_test::prelude::*;
use std::{
    fs::{read_link, read_to_string, remove_file, symlink_metadata},
    path::PathBuf,
};

fn fresh_repo() -> Result<(DotfileRepo, PathBuf)> {
    let home = make_dir("home")?;
    let repo = DotfileRepo::<Git2Vcs>::init("repo", &home)?;
    Ok((repo, home))
}

#[sealed_test]
fn add_moves_file_and_symlinks_it_home() -> Result<()> {
    let (mut repo, home) = fresh_repo()?;
    write_file(home.join(".bashrc"), "export EDITOR=nvim\n")?;

    let dotfile = repo.add(home.join(".bashrc"), LinkKind::Symlink)?;
    let in_repo = repo.dir().join("bashrc");
    assert_eq!(dotfile.repo_path(), in_repo);
    assert!(symlink_metadata(&in_repo)?.file_type().is_file());
    assert_eq!(read_link(home.join(".bashrc"))?, in_repo);
    assert_eq!(read_to_string(home.join(".bashrc"))?, "export EDITOR=nvim\n");

    let expect = InventoryEntry {
        path: "bashrc".into(),
        hardlink: false,
    };
    assert_eq!(repo.inventory()?.get("bashrc"), Some(&expect));
    assert_eq!(
        read_to_string(repo.dir().join(".mdots_files"))?,
        "bashrc:hardlink=false\n"
    );
    assert_eq!(commit_messages(repo.dir())?, vec!["[moredots] Add .bashrc"]);

    Ok(())
}

#[cfg(unix)]
#[sealed_test]
fn add_hardlink_shares_inode() -> Result<()> {
    use std::os::unix::fs::MetadataExt;

    let (mut repo, home) = fresh_repo()?;
    write_file(home.join(".bashrc"), "export EDITOR=nvim\n")?;

    repo.add(home.join(".bashrc"), LinkKind::Hardlink)?;
    let in_home = symlink_metadata(home.join(".bashrc"))?;
    let in_repo = symlink_metadata(repo.dir().join("bashrc"))?;
    assert!(!in_home.file_type().is_symlink());
    assert_eq!(in_home.ino(), in_repo.ino());
    assert!(repo.inventory()?.get("bashrc").unwrap().hardlink);

    Ok(())
}

#[sealed_test]
fn add_dot_directory_file_by_relative_path() -> Result<()> {
    let (mut repo, home) = fresh_repo()?;
    write_file(home.join(".config/nvim/init.lua"), "vim.o.number = true\n")?;

    let dotfile = repo.add("config/nvim/init.lua", LinkKind::Symlink)?;
    assert_eq!(dotfile.logical_path(), PathBuf::from(".config/nvim/init.lua"));
    assert_eq!(
        read_to_string(repo.dir().join("config/nvim/init.lua"))?,
        "vim.o.number = true\n"
    );
    assert_eq!(
        read_link(home.join(".config/nvim/init.lua"))?,
        repo.dir().join("config/nvim/init.lua")
    );
    assert!(repo.inventory()?.contains("config/nvim/init.lua"));

    Ok(())
}

#[sealed_test]
fn add_twice_is_rejected() -> Result<()> {
    let (mut repo, home) = fresh_repo()?;
    write_file(home.join(".vimrc"), "set number\n")?;
    repo.add(home.join(".vimrc"), LinkKind::Symlink)?;

    let result = repo.add(home.join(".vimrc"), LinkKind::Symlink);
    assert!(matches!(result, Err(RepoError::DuplicateDotfile { .. })));
    assert_eq!(commit_messages(repo.dir())?.len(), 1);
    assert_eq!(repo.inventory()?.len(), 1);
    assert_eq!(read_link(home.join(".vimrc"))?, repo.dir().join("vimrc"));

    Ok(())
}

#[sealed_test]
fn add_then_remove_restores_home() -> Result<()> {
    let (mut repo, home) = fresh_repo()?;
    write_file(home.join(".config/git/config"), "[core]\n\tpager = less\n")?;

    repo.add(home.join(".config/git/config"), LinkKind::Symlink)?;
    repo.remove(home.join(".config/git/config"))?;

    let in_home = symlink_metadata(home.join(".config/git/config"))?;
    assert!(in_home.file_type().is_file());
    assert_eq!(
        read_to_string(home.join(".config/git/config"))?,
        "[core]\n\tpager = less\n"
    );
    assert!(!repo.dir().join("config/git/config").exists());
    assert!(!repo.dir().join("config").exists());
    assert!(!repo.inventory()?.contains("config/git/config"));
    assert_eq!(
        commit_messages(repo.dir())?,
        vec![
            "[moredots] Remove .config/git/config",
            "[moredots] Add .config/git/config",
        ]
    );

    Ok(())
}

#[cfg(unix)]
#[sealed_test]
fn remove_hardlinked_dotfile_leaves_single_file() -> Result<()> {
    use std::os::unix::fs::MetadataExt;

    let (mut repo, home) = fresh_repo()?;
    write_file(home.join(".profile"), "umask 022\n")?;

    repo.add(home.join(".profile"), LinkKind::Hardlink)?;
    repo.remove(".profile")?;

    let in_home = symlink_metadata(home.join(".profile"))?;
    assert_eq!(in_home.nlink(), 1);
    assert_eq!(read_to_string(home.join(".profile"))?, "umask 022\n");
    assert!(repo.inventory()?.is_empty());

    Ok(())
}

#[sealed_test]
fn remove_by_repository_path() -> Result<()> {
    let (mut repo, home) = fresh_repo()?;
    write_file(home.join(".inputrc"), "set editing-mode vi\n")?;
    repo.add(".inputrc", LinkKind::Symlink)?;

    let in_repo = repo.dir().join("inputrc");
    let dotfile = repo.remove(&in_repo)?;
    assert_eq!(dotfile.home_path(), home.join(".inputrc"));
    assert!(!in_repo.exists());

    Ok(())
}

#[sealed_test]
fn remove_twice_is_rejected() -> Result<()> {
    let (mut repo, home) = fresh_repo()?;
    write_file(home.join(".vimrc"), "set number\n")?;
    repo.add(home.join(".vimrc"), LinkKind::Symlink)?;
    repo.remove(home.join(".vimrc"))?;

    let result = repo.remove(home.join(".vimrc"));
    assert!(matches!(result, Err(RepoError::DotfileNotFound { .. })));
    assert_eq!(read_to_string(home.join(".vimrc"))?, "set number\n");

    Ok(())
}

#[sealed_test]
fn add_rejects_paths_that_name_no_dotfile() -> Result<()> {
    let (mut repo, home) = fresh_repo()?;
    write_file(home.join("notes.txt"), "")?;
    write_file("elsewhere/.bashrc", "")?;

    let result = repo.add(home.join("notes.txt"), LinkKind::Symlink);
    assert!(matches!(result, Err(RepoError::InvalidPath(..))));
    let result = repo.add(make_dir("elsewhere")?.join(".bashrc"), LinkKind::Symlink);
    assert!(matches!(result, Err(RepoError::InvalidPath(..))));
    assert!(commit_messages(repo.dir())?.is_empty());

    Ok(())
}

#[sealed_test]
fn add_missing_file_fails_without_commit() -> Result<()> {
    let (mut repo, home) = fresh_repo()?;

    let result = repo.add(home.join(".missing"), LinkKind::Symlink);
    assert!(matches!(result, Err(RepoError::Filesystem(..))));
    assert!(commit_messages(repo.dir())?.is_empty());

    Ok(())
}

#[sealed_test]
fn repository_inside_home_directory() -> Result<()> {
    let home = make_dir("home")?;
    let mut repo = DotfileRepo::<Git2Vcs>::init(home.join("dotfiles"), &home)?;
    write_file(home.join(".bashrc"), "set -o vi\n")?;

    repo.add(home.join(".bashrc"), LinkKind::Symlink)?;
    assert_eq!(
        read_link(home.join(".bashrc"))?,
        home.join("dotfiles/bashrc")
    );

    let dotfile = repo.remove(home.join("dotfiles/bashrc"))?;
    assert_eq!(dotfile.logical_path(), PathBuf::from(".bashrc"));
    assert_eq!(read_to_string(home.join(".bashrc"))?, "set -o vi\n");

    Ok(())
}

#[cfg(unix)]
#[sealed_test]
fn add_rejects_name_with_inventory_separator() -> Result<()> {
    let (mut repo, home) = fresh_repo()?;
    write_file(home.join(".foo:bar"), "weird\n")?;
    write_file(home.join(".vimrc"), "set number\n")?;

    let result = repo.add(home.join(".foo:bar"), LinkKind::Symlink);
    assert!(matches!(
        result,
        Err(RepoError::Inventory(InventoryError::ReservedCharacter { found: ':', .. }))
    ));
    assert!(symlink_metadata(home.join(".foo:bar"))?.file_type().is_file());
    assert!(!repo.dir().join("foo:bar").exists());
    assert!(commit_messages(repo.dir())?.is_empty());

    let mut repo = DotfileRepo::<Git2Vcs>::open(repo.dir())?;
    repo.add(home.join(".vimrc"), LinkKind::Symlink)?;
    assert_eq!(repo.inventory()?.len(), 1);

    Ok(())
}

#[sealed_test]
fn add_rejects_double_dot_name() -> Result<()> {
    let (mut repo, home) = fresh_repo()?;
    write_file(home.join("..gitignore"), "target/\n")?;

    let result = repo.add(home.join("..gitignore"), LinkKind::Symlink);
    assert!(matches!(result, Err(RepoError::InvalidPath(..))));
    assert_eq!(read_to_string(home.join("..gitignore"))?, "target/\n");
    assert!(!repo.dir().join(".gitignore").exists());

    Ok(())
}

#[sealed_test]
fn remove_refuses_to_replace_unlinked_home_file() -> Result<()> {
    let (mut repo, home) = fresh_repo()?;
    write_file(home.join(".bashrc"), "tracked\n")?;
    repo.add(home.join(".bashrc"), LinkKind::Symlink)?;

    remove_file(home.join(".bashrc"))?;
    write_file(home.join(".bashrc"), "local edits\n")?;

    let result = repo.remove(home.join(".bashrc"));
    assert!(matches!(result, Err(RepoError::HomeFileInTheWay { .. })));
    assert_eq!(read_to_string(home.join(".bashrc"))?, "local edits\n");
    assert_eq!(read_to_string(repo.dir().join("bashrc"))?, "tracked\n");
    assert!(repo.inventory()?.contains("bashrc"));
    assert_eq!(commit_messages(repo.dir())?.len(), 1);

    Ok(())
}

#[sealed_test]
fn remove_when_home_link_is_missing() -> Result<()> {
    let (mut repo, home) = fresh_repo()?;
    write_file(home.join(".bashrc"), "tracked\n")?;
    repo.add(home.join(".bashrc"), LinkKind::Symlink)?;
    remove_file(home.join(".bashrc"))?;

    repo.remove(home.join(".bashrc"))?;
    assert_eq!(read_to_string(home.join(".bashrc"))?, "tracked\n");
    assert!(!repo.dir().join("bashrc").exists());

    Ok(())
}
