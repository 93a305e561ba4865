// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use moredots::{
    path::{default_config_file, default_repo_dir, home_dir},
    DotfileRepo, Git2Vcs, LinkKind, Settings,
};

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::{path::PathBuf, process::exit};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "mdots [options] <command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, global = true, value_name = "path")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        let config = match self.config {
            Some(path) => path,
            None => default_config_file()?,
        };
        let settings = Settings::load(config)?;

        match self.command {
            Command::Init(opts) => run_init(opts, &settings),
            Command::Add(opts) => run_add(opts, &settings),
            Command::Rm(opts) => run_rm(opts, &settings),
            Command::Sync(opts) => run_sync(opts, &settings),
            Command::Install(opts) => run_install(opts, &settings),
            Command::Ls(opts) => run_ls(opts, &settings),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Initialize new dotfile repository.
    #[command(override_usage = "mdots init [options] [dir]")]
    Init(InitOptions),

    /// Move dotfile into repository and link it back home.
    #[command(override_usage = "mdots add [options] <file> [repo]")]
    Add(AddOptions),

    /// Move dotfile out of repository back home.
    #[command(override_usage = "mdots rm <file> [repo]")]
    Rm(RmOptions),

    /// Pull from and push to remote, then relink dotfiles.
    #[command(override_usage = "mdots sync [url] [repo]")]
    Sync(SyncOptions),

    /// Clone dotfile repository and link every dotfile home.
    #[command(override_usage = "mdots install [options] <url> [dir]")]
    Install(InstallOptions),

    /// List tracked dotfiles.
    #[command(override_usage = "mdots ls [repo]")]
    Ls(LsOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct InitOptions {
    /// Path to new dotfile repository.
    #[arg(value_name = "dir")]
    pub dir: Option<PathBuf>,

    /// Path to home directory to link dotfiles into.
    #[arg(long, value_name = "dir")]
    pub home: Option<PathBuf>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct AddOptions {
    /// Dotfile to add.
    #[arg(required = true, value_name = "file")]
    pub file: PathBuf,

    /// Path to dotfile repository.
    #[arg(value_name = "repo")]
    pub repo: Option<PathBuf>,

    /// Link dotfile through a hardlink instead of a symlink.
    #[arg(long)]
    pub hardlink: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RmOptions {
    /// Dotfile to remove.
    #[arg(required = true, value_name = "file")]
    pub file: PathBuf,

    /// Path to dotfile repository.
    #[arg(value_name = "repo")]
    pub repo: Option<PathBuf>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct SyncOptions {
    /// URL of remote to (re)bind before synchronizing.
    #[arg(value_name = "url")]
    pub url: Option<String>,

    /// Path to dotfile repository.
    #[arg(value_name = "repo")]
    pub repo: Option<PathBuf>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct InstallOptions {
    /// URL of remote to clone from.
    #[arg(required = true, value_name = "url")]
    pub url: String,

    /// Path to clone dotfile repository into.
    #[arg(value_name = "dir")]
    pub dir: Option<PathBuf>,

    /// Path to home directory to link dotfiles into.
    #[arg(long, value_name = "dir")]
    pub home: Option<PathBuf>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct LsOptions {
    /// Path to dotfile repository.
    #[arg(value_name = "repo")]
    pub repo: Option<PathBuf>,
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = Cli::parse().run() {
        error!("fatal: {error:#}");
        exit(1);
    }

    exit(0)
}

fn repo_dir(arg: Option<PathBuf>, settings: &Settings) -> Result<PathBuf> {
    match arg.or_else(|| settings.repo_dir.clone()) {
        Some(path) => Ok(path),
        None => Ok(default_repo_dir()?),
    }
}

fn home(arg: Option<PathBuf>, settings: &Settings) -> Result<PathBuf> {
    match arg.or_else(|| settings.home_dir.clone()) {
        Some(path) => Ok(path),
        None => Ok(home_dir()?),
    }
}

fn run_init(opts: InitOptions, settings: &Settings) -> Result<()> {
    let repo = DotfileRepo::<Git2Vcs>::init(
        repo_dir(opts.dir, settings)?,
        home(opts.home, settings)?,
    )?;
    info!("initialized empty dotfile repository at {:?}", repo.dir().display());

    Ok(())
}

fn run_add(opts: AddOptions, settings: &Settings) -> Result<()> {
    let mut repo = DotfileRepo::<Git2Vcs>::open(repo_dir(opts.repo, settings)?)?;
    let kind = if opts.hardlink {
        LinkKind::Hardlink
    } else {
        settings.link_kind()
    };
    let dotfile = repo.add(opts.file, kind)?;
    info!("added {dotfile}");

    Ok(())
}

fn run_rm(opts: RmOptions, settings: &Settings) -> Result<()> {
    let mut repo = DotfileRepo::<Git2Vcs>::open(repo_dir(opts.repo, settings)?)?;
    let dotfile = repo.remove(opts.file)?;
    info!("removed {dotfile}");

    Ok(())
}

fn run_sync(opts: SyncOptions, settings: &Settings) -> Result<()> {
    let mut repo = DotfileRepo::<Git2Vcs>::open(repo_dir(opts.repo, settings)?)?;
    repo.sync(opts.url.as_deref())?;

    Ok(())
}

fn run_install(opts: InstallOptions, settings: &Settings) -> Result<()> {
    let repo = DotfileRepo::<Git2Vcs>::install(
        &opts.url,
        repo_dir(opts.dir, settings)?,
        home(opts.home, settings)?,
    )?;
    info!("installed {} into {:?}", opts.url, repo.dir().display());

    Ok(())
}

fn run_ls(opts: LsOptions, settings: &Settings) -> Result<()> {
    let mut repo = DotfileRepo::<Git2Vcs>::open(repo_dir(opts.repo, settings)?)?;
    for (dotfile, kind) in repo.tracked()? {
        println!("{dotfile}\t{kind}");
    }

    Ok(())
}
