// src/main.rs
//! Starpack Package Manager - CLI entry point

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "starpack")]
#[command(version)]
#[command(about = "The SFG OS package manager", long_about = None)]
#[command(after_help = "This Star Has Spaceship Powers.")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Install packages
    Install {
        /// Package names to install
        #[arg(required = true)]
        packages: Vec<String>,

        /// Alternative installation root
        #[arg(long, value_name = "DIR", default_value = "/")]
        installdir: String,

        /// Skip the confirmation prompt
        #[arg(long)]
        noconfirm: bool,
    },

    /// Remove packages
    Remove {
        /// Package names to remove
        #[arg(required = true)]
        packages: Vec<String>,

        /// Alternative installation root
        #[arg(long, value_name = "DIR", default_value = "/")]
        installdir: String,

        /// Remove even when other packages depend on these
        #[arg(long)]
        force: bool,
    },

    /// Update packages (all installed packages when none are named)
    Update {
        /// Package names to update
        packages: Vec<String>,

        /// Alternative installation root
        #[arg(long, value_name = "DIR", default_value = "/")]
        installdir: String,

        /// Skip the confirmation prompt
        #[arg(long)]
        noconfirm: bool,
    },

    /// List installed packages
    List,

    /// Show package details
    Info {
        /// Package name
        package: String,
    },

    /// Clean the package cache
    Clean,

    /// Manage repositories
    Repo {
        #[command(subcommand)]
        command: RepoCommands,
    },

    /// ?
    #[command(hide = true)]
    Spaceship,
}

#[derive(Subcommand)]
enum RepoCommands {
    /// List all repositories
    List,
    /// Add a new repository
    Add { url: String },
    /// Remove a repository
    Remove { url: String },
    /// Generate a repository index from a directory of packages
    Index { location: String },
    /// Add missing packages to an existing repository index
    AddMissing { location: String },
}

fn require_root(command: &str) -> Result<()> {
    if !nix::unistd::geteuid().is_root() {
        bail!("the '{}' command must be run as root", command);
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Install {
            packages,
            installdir,
            noconfirm,
        }) => {
            require_root("install")?;
            commands::cmd_install(&packages, &installdir, !noconfirm)
        }

        Some(Commands::Remove {
            packages,
            installdir,
            force,
        }) => {
            require_root("remove")?;
            commands::cmd_remove(&packages, &installdir, force)
        }

        Some(Commands::Update {
            packages,
            installdir,
            noconfirm,
        }) => {
            require_root("update")?;
            commands::cmd_update(&packages, &installdir, !noconfirm)
        }

        Some(Commands::List) => {
            require_root("list")?;
            commands::cmd_list("/")
        }

        Some(Commands::Info { package }) => commands::cmd_info(&package),

        Some(Commands::Clean) => {
            require_root("clean")?;
            commands::cmd_clean("/")
        }

        Some(Commands::Repo { command }) => match command {
            RepoCommands::List => commands::cmd_repo_list(),
            RepoCommands::Add { url } => commands::cmd_repo_add(&url),
            RepoCommands::Remove { url } => commands::cmd_repo_remove(&url),
            RepoCommands::Index { location } => commands::cmd_repo_index(&location),
            RepoCommands::AddMissing { location } => commands::cmd_repo_add_missing(&location),
        },

        Some(Commands::Spaceship) => {
            starpack::spaceship::print();
            Ok(())
        }

        None => {
            println!("Starpack v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'starpack --help' for usage information");
            Ok(())
        }
    }
}
