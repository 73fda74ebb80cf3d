//! CLI parse tests.

use super::{Cli, CliCommand};
use clap::Parser;

fn parse(args: &[&str]) -> CliCommand {
    let cli = Cli::try_parse_from(args).unwrap();
    cli.command
}

#[test]
fn cli_parse_serve_defaults() {
    match parse(&["dlm", "serve"]) {
        CliCommand::Serve { host, port } => {
            assert!(host.is_none());
            assert!(port.is_none());
        }
        _ => panic!("expected Serve"),
    }
}

#[test]
fn cli_parse_serve_overrides() {
    match parse(&["dlm", "serve", "--host", "0.0.0.0", "--port", "8080"]) {
        CliCommand::Serve { host, port } => {
            assert_eq!(host.as_deref(), Some("0.0.0.0"));
            assert_eq!(port, Some(8080));
        }
        _ => panic!("expected Serve"),
    }
}

#[test]
fn cli_parse_status() {
    match parse(&["dlm", "status"]) {
        CliCommand::Status => {}
        _ => panic!("expected Status"),
    }
}

#[test]
fn cli_rejects_bad_port_and_unknown_command() {
    assert!(Cli::try_parse_from(["dlm", "serve", "--port", "99999"]).is_err());
    assert!(Cli::try_parse_from(["dlm", "frobnicate"]).is_err());
    assert!(Cli::try_parse_from(["dlm"]).is_err());
}
