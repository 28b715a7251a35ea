//! CLI integration tests.
//!
//! These tests verify the CLI argument parsing and configuration loading.

use std::ffi::OsString;
use std::io::Write;
use tempfile::NamedTempFile;

use relay_tunnel::cli::{parse_args_from, Args, Command};
use relay_tunnel::config::Config;
use relay_tunnel::session::Feature;

fn args(args: &[&str]) -> Vec<OsString> {
    std::iter::once("relay-tunnel")
        .chain(args.iter().copied())
        .map(OsString::from)
        .collect()
}

fn config_file(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();
    file
}

// ============================================================================
// CLI Argument Tests
// ============================================================================

#[test]
fn test_cli_no_command() {
    let result = parse_args_from(args(&[])).unwrap();

    assert!(result.command.is_none());
    assert!(result.config.is_none());
    assert!(result.relay_url.is_none());
    assert!(!result.help);
}

#[test]
fn test_cli_launch_contract() {
    // The manager re-invokes the binary exactly like this.
    let result = parse_args_from(args(&["http", "lab"])).unwrap();
    assert_eq!(
        result.command,
        Some(Command::Serve {
            feature: Feature::Http,
            session_id: "lab".parse().unwrap(),
        })
    );

    let result = parse_args_from(args(&["ssh", "lab"])).unwrap();
    assert!(matches!(
        result.command,
        Some(Command::Serve {
            feature: Feature::Shell,
            ..
        })
    ));
}

#[test]
fn test_cli_full_options() {
    let result = parse_args_from(args(&[
        "-u",
        "https://relay.example",
        "-a",
        "token",
        "-p",
        "8000",
        "-t",
        "3000",
        "-l",
        "debug",
        "connect",
        "http",
        "web",
    ]))
    .unwrap();

    assert_eq!(result.relay_url.as_deref(), Some("https://relay.example"));
    assert_eq!(result.auth.as_deref(), Some("token"));
    assert_eq!(result.port, Some(8000));
    assert_eq!(result.target_port, Some(3000));
    assert_eq!(result.log_level.as_deref(), Some("debug"));
    assert!(matches!(
        result.command,
        Some(Command::Connect {
            feature: Feature::Http,
            ..
        })
    ));
}

#[test]
fn test_cli_rejects_bad_input() {
    assert!(parse_args_from(args(&["-p", "not-a-number", "manage"])).is_err());
    assert!(parse_args_from(args(&["ftp", "lab"])).is_err());
    assert!(parse_args_from(args(&["shell"])).is_err());
    assert!(parse_args_from(args(&["shell", "a.b"])).is_err());
    assert!(parse_args_from(args(&["shell", "lab", "extra"])).is_err());
}

// ============================================================================
// Configuration Loading Tests
// ============================================================================

#[test]
fn test_config_from_json_file() {
    let file = config_file(
        r#"{
        "relay": {
            "url": "https://relay.example",
            "reconnect_delay_ms": 250
        },
        "proxy": {
            "port": 9000,
            "timeout_secs": 5
        },
        "forward": {
            "host": "127.0.0.1"
        },
        "manage": {
            "autostart": [
                { "feature": "shell", "sessionId": "lab" },
                { "feature": "http", "sessionId": "web", "port": 8080 }
            ]
        },
        "logging": {
            "level": "debug"
        }
    }"#,
    );

    let config = Config::from_file(file.path()).unwrap();

    assert_eq!(config.relay.url.as_deref(), Some("https://relay.example"));
    assert_eq!(config.reconnect_delay().as_millis(), 250);
    assert_eq!(config.proxy.port, 9000);
    assert_eq!(config.proxy_timeout().as_secs(), 5);
    assert_eq!(config.forward.host, "127.0.0.1");
    assert_eq!(config.manage.autostart.len(), 2);
    assert_eq!(config.manage.autostart[1].port, Some(8080));
    assert_eq!(config.log_filter(), "debug");
    assert_eq!(config.source.as_deref(), Some(file.path()));
}

#[test]
fn test_config_partial_json() {
    let file = config_file(r#"{ "proxy": { "port": 5000 } }"#);
    let config = Config::from_file(file.path()).unwrap();

    assert_eq!(config.proxy.port, 5000);
    assert_eq!(config.proxy.host, "127.0.0.1");
    assert_eq!(config.manage.port, 55777);
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_config_invalid_json() {
    let file = config_file("{ invalid json }");
    assert!(Config::from_file(file.path()).is_err());
}

#[test]
fn test_config_missing_file() {
    let args = Args {
        config: Some("/nonexistent/relay-tunnel.json".into()),
        ..Args::default()
    };
    assert!(Config::load(&args).is_err());
}

#[test]
fn test_config_cli_overrides_file() {
    let file = config_file(
        r#"{
        "relay": { "url": "https://from-file.example" },
        "proxy": { "port": 5000 }
    }"#,
    );

    let args = parse_args_from(args(&[
        "-c",
        file.path().to_str().unwrap(),
        "-u",
        "https://from-cli.example",
        "-p",
        "8080",
        "connect",
        "http",
        "web",
    ]))
    .unwrap();

    let config = Config::load(&args).unwrap();

    assert_eq!(config.relay_url().unwrap(), "https://from-cli.example");
    assert_eq!(config.proxy.port, 8080);
}

#[test]
fn test_config_manage_port_positional() {
    let args = parse_args_from(args(&["-p", "9000", "manage", "9100"])).unwrap();
    let config = Config::load(&args).unwrap();

    assert_eq!(config.manage.port, 9100);
    assert_eq!(config.proxy.port, 55080);
}
