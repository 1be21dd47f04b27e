// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: alternative install root
fn installdir_arg() -> Arg {
    Arg::new("installdir")
        .long("installdir")
        .value_name("DIR")
        .default_value("/")
        .help("Alternative installation root")
}

fn build_cli() -> Command {
    Command::new("starpack")
        .version(env!("CARGO_PKG_VERSION"))
        .about("The SFG OS package manager")
        .subcommand_required(false)
        .subcommand(
            Command::new("install")
                .about("Install packages")
                .arg(Arg::new("packages").num_args(1..).required(true))
                .arg(installdir_arg())
                .arg(
                    Arg::new("noconfirm")
                        .long("noconfirm")
                        .action(ArgAction::SetTrue)
                        .help("Skip the confirmation prompt"),
                ),
        )
        .subcommand(
            Command::new("remove")
                .about("Remove packages")
                .arg(Arg::new("packages").num_args(1..).required(true))
                .arg(installdir_arg())
                .arg(
                    Arg::new("force")
                        .long("force")
                        .action(ArgAction::SetTrue)
                        .help("Remove even when other packages depend on these"),
                ),
        )
        .subcommand(
            Command::new("update")
                .about("Update packages (all installed packages when none are named)")
                .arg(Arg::new("packages").num_args(0..))
                .arg(installdir_arg())
                .arg(
                    Arg::new("noconfirm")
                        .long("noconfirm")
                        .action(ArgAction::SetTrue)
                        .help("Skip the confirmation prompt"),
                ),
        )
        .subcommand(Command::new("list").about("List installed packages"))
        .subcommand(
            Command::new("info")
                .about("Show package details")
                .arg(Arg::new("package").required(true)),
        )
        .subcommand(Command::new("clean").about("Clean the package cache"))
        .subcommand(
            Command::new("repo")
                .about("Manage repositories")
                .subcommand(Command::new("list").about("List all repositories"))
                .subcommand(
                    Command::new("add")
                        .about("Add a new repository")
                        .arg(Arg::new("url").required(true)),
                )
                .subcommand(
                    Command::new("remove")
                        .about("Remove a repository")
                        .arg(Arg::new("url").required(true)),
                )
                .subcommand(
                    Command::new("index")
                        .about("Generate a repository index from a directory of packages")
                        .arg(Arg::new("location").required(true)),
                )
                .subcommand(
                    Command::new("add-missing")
                        .about("Add missing packages to an existing repository index")
                        .arg(Arg::new("location").required(true)),
                ),
        )
}

fn main() -> std::io::Result<()> {
    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR not set"));

    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer: Vec<u8> = Vec::new();
    man.render(&mut buffer)?;

    fs::write(out_dir.join("starpack.1"), buffer)?;

    println!("cargo:rerun-if-changed=build.rs");
    Ok(())
}
