//! Tests for show, uninstall, checksum and completions.

use super::parse;
use crate::cli::{Cli, CliCommand};
use clap::Parser;
use clap_complete::Shell;
use std::path::PathBuf;

#[test]
fn cli_parse_show() {
    match parse(&["pour", "show", "gpup.toml", "--var", "VERSION=v1", "--platform", "linux_arm64"]) {
        CliCommand::Show {
            descriptor,
            prefix,
            vars,
            platform,
        } => {
            assert_eq!(descriptor, PathBuf::from("gpup.toml"));
            assert!(prefix.is_none());
            assert_eq!(vars, vec!["VERSION=v1"]);
            assert_eq!(platform.as_deref(), Some("linux_arm64"));
        }
        _ => panic!("expected Show"),
    }
}

#[test]
fn cli_parse_uninstall() {
    match parse(&["pour", "uninstall", "gpup", "--prefix", "/tmp/p"]) {
        CliCommand::Uninstall { name, prefix } => {
            assert_eq!(name, "gpup");
            assert_eq!(prefix, Some(PathBuf::from("/tmp/p")));
        }
        _ => panic!("expected Uninstall"),
    }
}

#[test]
fn cli_parse_checksum() {
    match parse(&["pour", "checksum", "/tmp/gpup_linux_amd64.zip"]) {
        CliCommand::Checksum { path } => {
            assert_eq!(path, PathBuf::from("/tmp/gpup_linux_amd64.zip"))
        }
        _ => panic!("expected Checksum"),
    }
}

#[test]
fn cli_parse_completions() {
    match parse(&["pour", "completions", "zsh"]) {
        CliCommand::Completions { shell } => assert_eq!(shell, Shell::Zsh),
        _ => panic!("expected Completions"),
    }
    assert!(Cli::try_parse_from(["pour", "completions", "tcsh"]).is_err());
}

#[test]
fn cli_rejects_unknown_subcommand() {
    assert!(Cli::try_parse_from(["pour", "upgrade"]).is_err());
}
