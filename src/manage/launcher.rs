//! Spawning of tunnel endpoint processes.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::{Child, Command};

use crate::config::{Config, ENV_AUTH, ENV_CONFIG, ENV_SESSION_PORT, ENV_URL};
use crate::error::TunnelError;
use crate::session::{Feature, SessionId};
use crate::Result;

/// Starts the process serving one session.
pub trait Launcher: Send + Sync {
    fn launch(&self, feature: Feature, session_id: &SessionId, port: Option<u16>) -> Result<Child>;
}

/// Re-invokes this executable as `<program> <feature> <sessionId>`.
///
/// The child inherits the environment plus the relay settings, and its
/// standard streams are discarded. A session port travels in
/// `RELAY_TUNNEL_SESSION_PORT`.
#[derive(Debug, Clone)]
pub struct SelfLauncher {
    program: PathBuf,
    env: Vec<(String, String)>,
}

impl SelfLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            env: Vec::new(),
        }
    }

    /// Launcher for the running executable.
    pub fn current() -> Result<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }

    /// Launcher for the running executable passing on `config`'s relay
    /// settings.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut launcher = Self::current()?;
        if let Some(ref url) = config.relay.url {
            launcher = launcher.env(ENV_URL, url);
        }
        if let Some(ref auth) = config.relay.auth {
            launcher = launcher.env(ENV_AUTH, auth);
        }
        if let Some(ref path) = config.source {
            launcher = launcher.env(ENV_CONFIG, path.to_string_lossy());
        }
        Ok(launcher)
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// The command `launch` runs.
    pub fn command(&self, feature: Feature, session_id: &SessionId, port: Option<u16>) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg(feature.as_str())
            .arg(session_id.as_str())
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        match port {
            Some(port) => cmd.env(ENV_SESSION_PORT, port.to_string()),
            None => cmd.env_remove(ENV_SESSION_PORT),
        };
        cmd
    }
}

impl Launcher for SelfLauncher {
    fn launch(&self, feature: Feature, session_id: &SessionId, port: Option<u16>) -> Result<Child> {
        self.command(feature, session_id, port)
            .spawn()
            .map_err(|e| TunnelError::Spawn(format!("{}: {}", self.program.display(), e)))
    }
}
