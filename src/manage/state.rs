//! Orchestrator state records.

use std::collections::{BTreeMap, VecDeque};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::error::TunnelError;
use crate::session::{Feature, SessionId};

/// History entries retained per feature.
pub const HISTORY_LIMIT: usize = 200;

/// History entries exposed by a status read.
pub const HISTORY_VISIBLE: usize = 20;

/// Operation requested through the admin API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Enable,
    Disable,
    Start,
    Stop,
}

impl FromStr for Action {
    type Err = TunnelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enable" => Ok(Action::Enable),
            "disable" => Ok(Action::Disable),
            "start" => Ok(Action::Start),
            "stop" => Ok(Action::Stop),
            other => Err(TunnelError::UnknownAction(other.to_string())),
        }
    }
}

/// What a history entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryAction {
    Enable,
    Disable,
    Start,
    Stop,
    /// A supervised process ended on its own.
    Exit,
}

/// One immutable history record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub action: HistoryAction,
    pub time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Exit code, for `exit` entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
}

impl HistoryEntry {
    pub fn new(action: HistoryAction) -> Self {
        Self {
            action,
            time: Utc::now(),
            session_id: None,
            port: None,
            code: None,
        }
    }

    pub fn with_session(mut self, session_id: &SessionId, port: Option<u16>) -> Self {
        self.session_id = Some(session_id.to_string());
        self.port = port;
        self
    }

    pub fn with_code(mut self, code: Option<i32>) -> Self {
        self.code = code;
        self
    }
}

/// Liveness of a supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Running,
    Stopped,
}

/// Key of a live session within its feature.
///
/// HTTP sessions started for a specific port are keyed `id:port`, so the
/// same id may serve several ports.
pub fn session_key(feature: Feature, session_id: &SessionId, port: Option<u16>) -> String {
    match (feature, port) {
        (Feature::Http, Some(port)) => format!("{}:{}", session_id, port),
        _ => session_id.to_string(),
    }
}

/// A supervised tunnel endpoint process.
#[derive(Debug)]
pub struct ProcessHandle {
    pub session_id: SessionId,
    pub pid: Option<u32>,
    pub status: ProcessStatus,
    pub started_at: DateTime<Utc>,
    pub port: Option<u16>,
    /// Distinguishes this process from earlier ones with the same key.
    pub(crate) instance: u64,
    /// Fires the supervisor's kill path. Dropping it also kills.
    pub(crate) kill: Option<oneshot::Sender<()>>,
}

impl ProcessHandle {
    /// Mark stopped and ask the supervisor to kill the process.
    pub(crate) fn terminate(&mut self) {
        self.status = ProcessStatus::Stopped;
        if let Some(kill) = self.kill.take() {
            let _ = kill.send(());
        }
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.to_string(),
            status: self.status,
            started_at: self.started_at,
            pid: self.pid,
            port: self.port,
        }
    }
}

/// Public view of a live session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub status: ProcessStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// Public view of one feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureStatus {
    pub enabled: bool,
    pub running: bool,
    pub sessions: Vec<SessionSummary>,
    pub last: Option<HistoryEntry>,
    pub history: Vec<HistoryEntry>,
}

/// Enable flag of every feature.
pub type FeatureFlags = BTreeMap<Feature, bool>;

/// Status of every feature, keyed by feature name.
pub type StatusSnapshot = BTreeMap<Feature, FeatureStatus>;

/// Flag, live sessions and history of one feature.
#[derive(Debug)]
pub(crate) struct FeatureState {
    pub enabled: bool,
    pub sessions: BTreeMap<String, ProcessHandle>,
    history: VecDeque<HistoryEntry>,
}

impl Default for FeatureState {
    fn default() -> Self {
        Self {
            enabled: true,
            sessions: BTreeMap::new(),
            history: VecDeque::new(),
        }
    }
}

impl FeatureState {
    pub fn record(&mut self, entry: HistoryEntry) {
        self.history.push_back(entry);
        while self.history.len() > HISTORY_LIMIT {
            self.history.pop_front();
        }
    }

    pub fn status(&self) -> FeatureStatus {
        let skip = self.history.len().saturating_sub(HISTORY_VISIBLE);
        FeatureStatus {
            enabled: self.enabled,
            running: !self.sessions.is_empty(),
            sessions: self.sessions.values().map(ProcessHandle::summary).collect(),
            last: self.history.back().cloned(),
            history: self.history.iter().skip(skip).cloned().collect(),
        }
    }
}
