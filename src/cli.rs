//! Command-line interface for relay-tunnel.
//!
//! Uses lexopt for minimal binary size overhead (~34KB).

use std::ffi::OsString;
use std::path::PathBuf;

use thiserror::Error;

use crate::session::{Feature, SessionId};

/// What the process was asked to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Serve one tunnel endpoint on this host (`shell <ID>`, `http <ID>`).
    Serve {
        feature: Feature,
        session_id: SessionId,
    },
    /// Run the session orchestrator and its admin API.
    Manage { port: Option<u16> },
    /// Attach the client side of a tunnel (`connect shell|http <ID>`).
    Connect {
        feature: Feature,
        session_id: SessionId,
    },
}

/// Command-line arguments.
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// Subcommand, `None` when only `-h`/`-V` were given.
    pub command: Option<Command>,
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// Relay store base URL.
    pub relay_url: Option<String>,
    /// Relay store auth token.
    pub auth: Option<String>,
    /// Listen port for the local proxy or the admin API.
    pub port: Option<u16>,
    /// Fixed target port for the local proxy.
    pub target_port: Option<u16>,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
    /// Show version and exit.
    pub version: bool,
    /// Show help and exit.
    pub help: bool,
}

/// Parse command-line arguments.
pub fn parse_args() -> Result<Args, ArgsError> {
    parse_args_from(std::env::args_os())
}

/// Parse arguments from an iterator (for testing).
pub fn parse_args_from<I>(args: I) -> Result<Args, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    use lexopt::prelude::*;

    let mut result = Args::default();
    let mut positionals = Vec::new();
    let mut parser = lexopt::Parser::from_iter(args);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => {
                result.help = true;
            }
            Short('V') | Long("version") => {
                result.version = true;
            }
            Short('c') | Long("config") => {
                result.config = Some(parser.value()?.parse()?);
            }
            Short('u') | Long("url") => {
                result.relay_url = Some(parser.value()?.parse()?);
            }
            Short('a') | Long("auth") => {
                result.auth = Some(parser.value()?.parse()?);
            }
            Short('p') | Long("port") => {
                let value: String = parser.value()?.parse()?;
                result.port = Some(parse_port("port", value)?);
            }
            Short('t') | Long("target-port") => {
                let value: String = parser.value()?.parse()?;
                result.target_port = Some(parse_port("target-port", value)?);
            }
            Short('l') | Long("log-level") => {
                result.log_level = Some(parser.value()?.parse()?);
            }
            Value(val) => {
                positionals.push(val.to_string_lossy().into_owned());
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    if !positionals.is_empty() {
        result.command = Some(parse_command(positionals)?);
    }

    Ok(result)
}

fn parse_command(positionals: Vec<String>) -> Result<Command, ArgsError> {
    let mut words = positionals.into_iter();
    let Some(first) = words.next() else {
        return Err(ArgsError::MissingArgument("command"));
    };

    let command = match first.as_str() {
        "manage" => Command::Manage {
            port: words
                .next()
                .map(|value| parse_port("port", value))
                .transpose()?,
        },
        "connect" => {
            let feature = parse_feature(words.next())?;
            let session_id = parse_session_id(words.next())?;
            Command::Connect {
                feature,
                session_id,
            }
        }
        _ => {
            let feature = parse_feature(Some(first))?;
            let session_id = parse_session_id(words.next())?;
            Command::Serve {
                feature,
                session_id,
            }
        }
    };

    match words.next() {
        Some(extra) => Err(ArgsError::UnexpectedArgument(extra)),
        None => Ok(command),
    }
}

fn parse_feature(value: Option<String>) -> Result<Feature, ArgsError> {
    let value = value.ok_or(ArgsError::MissingArgument("feature"))?;
    value
        .parse()
        .map_err(|_| ArgsError::UnknownCommand(value))
}

fn parse_session_id(value: Option<String>) -> Result<SessionId, ArgsError> {
    let value = value.ok_or(ArgsError::MissingArgument("session id"))?;
    value
        .parse()
        .map_err(|_| ArgsError::InvalidValue("session-id", value))
}

fn parse_port(name: &'static str, value: String) -> Result<u16, ArgsError> {
    match value.parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(ArgsError::InvalidValue(name, value)),
    }
}

/// Print help message.
pub fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"relay-tunnel {version}
Shell and HTTP tunnels relayed through a realtime database

USAGE:
    relay-tunnel [OPTIONS] shell <SESSION_ID>
    relay-tunnel [OPTIONS] http <SESSION_ID>
    relay-tunnel [OPTIONS] manage [PORT]
    relay-tunnel [OPTIONS] connect shell <SESSION_ID>
    relay-tunnel [OPTIONS] connect http <SESSION_ID>

COMMANDS:
    shell <ID>              Serve an interactive shell for session ID
    http <ID>               Serve local HTTP services for session ID
    manage [PORT]           Run the session manager and admin API [default: 55777]
    connect shell <ID>      Attach this console to a shell session (type ..1 to leave)
    connect http <ID>       Run a local reverse proxy into an HTTP session

OPTIONS:
    -c, --config <FILE>       Path to configuration file (JSON)
    -u, --url <URL>           Relay database URL
    -a, --auth <TOKEN>        Relay database auth token
    -p, --port <PORT>         Listen port for the proxy or admin API
    -t, --target-port <PORT>  Forward every proxied request to this port
    -l, --log-level <LVL>     Log level (error, warn, info, debug, trace)
    -h, --help                Print help
    -V, --version             Print version

ENVIRONMENT VARIABLES:
    RELAY_TUNNEL_CONFIG       Configuration file path
    RELAY_TUNNEL_URL          Relay database URL (overrides config)
    RELAY_TUNNEL_AUTH         Relay auth token (overrides config)
    RELAY_TUNNEL_LOG_LEVEL    Log level (overrides config)
    RUST_LOG                  Full tracing filter

EXAMPLES:
    # Expose a shell on this machine as session "lab"
    relay-tunnel -u https://example.firebaseio.com shell lab

    # Attach to it from elsewhere
    relay-tunnel -u https://example.firebaseio.com connect shell lab

    # Proxy http://127.0.0.1:55080/8080/ to port 8080 on the remote host
    relay-tunnel -u https://example.firebaseio.com connect http lab

    # Supervise sessions from a browser
    relay-tunnel -c /etc/relay-tunnel/config.json manage
"#
    );
}

/// Print version.
pub fn print_version() {
    println!("relay-tunnel {}", env!("CARGO_PKG_VERSION"));
}

/// Argument parsing errors.
#[derive(Debug, Error)]
pub enum ArgsError {
    /// Lexopt parsing error.
    #[error("{0}")]
    Lexopt(#[from] lexopt::Error),
    /// Invalid argument value.
    #[error("invalid value for --{0}: '{1}'")]
    InvalidValue(&'static str, String),
    /// Unknown command word.
    #[error("unknown command: '{0}'")]
    UnknownCommand(String),
    /// Required positional argument missing.
    #[error("missing {0}")]
    MissingArgument(&'static str),
    /// Unexpected positional argument.
    #[error("unexpected argument: '{0}'")]
    UnexpectedArgument(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(args: &[&str]) -> Vec<OsString> {
        std::iter::once("relay-tunnel")
            .chain(args.iter().copied())
            .map(OsString::from)
            .collect()
    }

    fn id(value: &str) -> SessionId {
        value.parse().unwrap()
    }

    #[test]
    fn test_default_args() {
        let result = parse_args_from(args(&[])).unwrap();
        assert!(result.command.is_none());
        assert!(result.port.is_none());
        assert!(!result.help);
    }

    #[test]
    fn test_serve_commands() {
        let result = parse_args_from(args(&["shell", "lab"])).unwrap();
        assert_eq!(
            result.command,
            Some(Command::Serve {
                feature: Feature::Shell,
                session_id: id("lab"),
            })
        );

        let result = parse_args_from(args(&["http", "lab"])).unwrap();
        assert_eq!(
            result.command,
            Some(Command::Serve {
                feature: Feature::Http,
                session_id: id("lab"),
            })
        );
    }

    #[test]
    fn test_ssh_alias() {
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
    fn test_connect_commands() {
        let result = parse_args_from(args(&["connect", "http", "web"])).unwrap();
        assert_eq!(
            result.command,
            Some(Command::Connect {
                feature: Feature::Http,
                session_id: id("web"),
            })
        );
    }

    #[test]
    fn test_manage_port() {
        let result = parse_args_from(args(&["manage"])).unwrap();
        assert_eq!(result.command, Some(Command::Manage { port: None }));

        let result = parse_args_from(args(&["manage", "6000"])).unwrap();
        assert_eq!(result.command, Some(Command::Manage { port: Some(6000) }));

        assert!(parse_args_from(args(&["manage", "0"])).is_err());
    }

    #[test]
    fn test_options_anywhere() {
        let result = parse_args_from(args(&[
            "connect",
            "-t",
            "3000",
            "http",
            "web",
            "--port",
            "9000",
        ]))
        .unwrap();
        assert_eq!(result.target_port, Some(3000));
        assert_eq!(result.port, Some(9000));
        assert!(matches!(result.command, Some(Command::Connect { .. })));
    }

    #[test]
    fn test_relay_options() {
        let result = parse_args_from(args(&[
            "-u",
            "https://db.example.com",
            "-a",
            "secret",
            "-c",
            "/etc/config.json",
            "-l",
            "debug",
        ]))
        .unwrap();
        assert_eq!(result.relay_url.as_deref(), Some("https://db.example.com"));
        assert_eq!(result.auth.as_deref(), Some("secret"));
        assert_eq!(result.config, Some(PathBuf::from("/etc/config.json")));
        assert_eq!(result.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_help_flag() {
        let result = parse_args_from(args(&["-h"])).unwrap();
        assert!(result.help);

        let result = parse_args_from(args(&["--help"])).unwrap();
        assert!(result.help);
    }

    #[test]
    fn test_version_flag() {
        let result = parse_args_from(args(&["-V"])).unwrap();
        assert!(result.version);

        let result = parse_args_from(args(&["--version"])).unwrap();
        assert!(result.version);
    }

    #[test]
    fn test_missing_session_id() {
        let err = parse_args_from(args(&["shell"])).unwrap_err();
        assert!(matches!(err, ArgsError::MissingArgument("session id")));

        let err = parse_args_from(args(&["connect", "shell"])).unwrap_err();
        assert!(matches!(err, ArgsError::MissingArgument("session id")));
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(
            parse_args_from(args(&["ftp", "lab"])).unwrap_err(),
            ArgsError::UnknownCommand(_)
        ));
        assert!(matches!(
            parse_args_from(args(&["shell", "a/b"])).unwrap_err(),
            ArgsError::InvalidValue("session-id", _)
        ));
        assert!(matches!(
            parse_args_from(args(&["shell", "lab", "extra"])).unwrap_err(),
            ArgsError::UnexpectedArgument(_)
        ));
        assert!(parse_args_from(args(&["-p", "invalid"])).is_err());
        assert!(parse_args_from(args(&["--bogus"])).is_err());
    }
}
