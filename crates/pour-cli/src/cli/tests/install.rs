//! Tests for the install subcommand.

use super::parse;
use crate::cli::{Cli, CliCommand};
use clap::Parser;
use std::path::{Path, PathBuf};

#[test]
fn cli_parse_install_defaults() {
    match parse(&["pour", "install", "gpup.toml"]) {
        CliCommand::Install {
            descriptor,
            prefix,
            skip_verify,
            dry_run,
            vars,
            platform,
            keep_download,
        } => {
            assert_eq!(descriptor, PathBuf::from("gpup.toml"));
            assert!(prefix.is_none());
            assert!(!skip_verify);
            assert!(!dry_run);
            assert!(vars.is_empty());
            assert!(platform.is_none());
            assert!(!keep_download);
        }
        _ => panic!("expected Install"),
    }
}

#[test]
fn cli_parse_install_all_flags() {
    match parse(&[
        "pour",
        "install",
        "formulas/gpup.toml",
        "--prefix",
        "/opt/pour",
        "--skip-verify",
        "--dry-run",
        "--var",
        "VERSION=1.2.3",
        "--var",
        "GPUP_SHA256=abc",
        "--platform",
        "darwin_amd64",
        "--keep-download",
    ]) {
        CliCommand::Install {
            prefix,
            skip_verify,
            dry_run,
            vars,
            platform,
            keep_download,
            ..
        } => {
            assert_eq!(prefix.as_deref(), Some(Path::new("/opt/pour")));
            assert!(skip_verify);
            assert!(dry_run);
            assert_eq!(vars, vec!["VERSION=1.2.3", "GPUP_SHA256=abc"]);
            assert_eq!(platform.as_deref(), Some("darwin_amd64"));
            assert!(keep_download);
        }
        _ => panic!("expected Install"),
    }
}

#[test]
fn cli_install_requires_descriptor() {
    assert!(Cli::try_parse_from(["pour", "install"]).is_err());
}
