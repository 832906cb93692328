//! Tests for status, pause, resume, cancel, remove, completions.

use super::parse;
use crate::cli::CliCommand;

#[test]
fn cli_parse_status() {
    match parse(&["segdl", "status"]) {
        CliCommand::Status => {}
        _ => panic!("expected Status"),
    }
}

#[test]
fn cli_parse_pause() {
    match parse(&["segdl", "pause", "42"]) {
        CliCommand::Pause { id } => assert_eq!(id, 42),
        _ => panic!("expected Pause"),
    }
}

#[test]
fn cli_parse_resume() {
    match parse(&["segdl", "resume", "1"]) {
        CliCommand::Resume { id, restart } => {
            assert_eq!(id, 1);
            assert!(!restart);
        }
        _ => panic!("expected Resume"),
    }
    match parse(&["segdl", "resume", "1", "--restart"]) {
        CliCommand::Resume { restart, .. } => assert!(restart),
        _ => panic!("expected Resume with --restart"),
    }
}

#[test]
fn cli_parse_cancel() {
    match parse(&["segdl", "cancel", "7"]) {
        CliCommand::Cancel { id } => assert_eq!(id, 7),
        _ => panic!("expected Cancel"),
    }
}

#[test]
fn cli_parse_remove() {
    match parse(&["segdl", "remove", "99"]) {
        CliCommand::Remove { id, delete_files } => {
            assert_eq!(id, 99);
            assert!(!delete_files);
        }
        _ => panic!("expected Remove"),
    }
    match parse(&["segdl", "remove", "1", "--delete-files"]) {
        CliCommand::Remove { delete_files, .. } => assert!(delete_files),
        _ => panic!("expected Remove with --delete-files"),
    }
}

#[test]
fn cli_parse_completions() {
    match parse(&["segdl", "completions", "bash"]) {
        CliCommand::Completions { shell } => assert_eq!(shell, clap_complete::Shell::Bash),
        _ => panic!("expected Completions"),
    }
}

#[test]
fn cli_rejects_non_numeric_id() {
    use clap::Parser;
    assert!(crate::cli::Cli::try_parse_from(["segdl", "pause", "abc"]).is_err());
}
