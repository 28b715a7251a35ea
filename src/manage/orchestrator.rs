//! Session orchestrator.
//!
//! Flags, live process handles and history of every feature sit behind one
//! mutex. Each started process gets a supervisor task that either observes
//! its exit or kills it when the handle asks to. Exits feed back into the
//! same state as explicit stops.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tokio::process::Child;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::launcher::Launcher;
use super::state::{
    session_key, Action, FeatureFlags, FeatureState, HistoryAction, HistoryEntry, ProcessHandle,
    ProcessStatus, StatusSnapshot,
};
use crate::error::TunnelError;
use crate::session::{Feature, SessionId};
use crate::Result;

struct State {
    features: BTreeMap<Feature, FeatureState>,
    next_instance: u64,
}

impl State {
    fn new() -> Self {
        let features = Feature::ALL
            .iter()
            .map(|feature| (*feature, FeatureState::default()))
            .collect();
        Self {
            features,
            next_instance: 0,
        }
    }

    fn feature(&mut self, feature: Feature) -> &mut FeatureState {
        self.features.entry(feature).or_default()
    }
}

/// Supervises tunnel endpoint processes for every feature.
#[derive(Clone)]
pub struct SessionOrchestrator {
    inner: Arc<Mutex<State>>,
    launcher: Arc<dyn Launcher>,
}

impl SessionOrchestrator {
    /// Create an orchestrator with every feature enabled.
    pub fn new(launcher: Arc<dyn Launcher>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(State::new())),
            launcher,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.inner.lock().map_err(|_| TunnelError::LockPoisoned)
    }

    /// Snapshot of flags, live sessions and recent history.
    pub fn status(&self) -> Result<StatusSnapshot> {
        let state = self.lock()?;
        Ok(state
            .features
            .iter()
            .map(|(feature, fs)| (*feature, fs.status()))
            .collect())
    }

    pub fn flags(&self) -> Result<FeatureFlags> {
        let state = self.lock()?;
        Ok(state
            .features
            .iter()
            .map(|(feature, fs)| (*feature, fs.enabled))
            .collect())
    }

    /// Apply an admin request given as raw strings.
    ///
    /// The feature name is checked before the action.
    pub fn apply(
        &self,
        feature: &str,
        action: &str,
        session_id: Option<&str>,
        port: Option<u16>,
    ) -> Result<()> {
        let feature: Feature = feature.parse()?;
        let action: Action = action.parse()?;
        self.set_feature(feature, action, session_id, port)
    }

    /// Enable, disable, start or stop sessions of `feature`.
    pub fn set_feature(
        &self,
        feature: Feature,
        action: Action,
        session_id: Option<&str>,
        port: Option<u16>,
    ) -> Result<()> {
        match action {
            Action::Enable => {
                let mut state = self.lock()?;
                let fs = state.feature(feature);
                fs.enabled = true;
                fs.record(HistoryEntry::new(HistoryAction::Enable));
                info!(%feature, "feature enabled");
                Ok(())
            }
            Action::Disable => {
                let mut state = self.lock()?;
                let fs = state.feature(feature);
                fs.enabled = false;
                fs.record(HistoryEntry::new(HistoryAction::Disable));
                let stopped = stop_all(fs);
                info!(%feature, stopped, "feature disabled");
                Ok(())
            }
            Action::Start => self.start(feature, session_id, port),
            Action::Stop => self.stop(feature, session_id, port),
        }
    }

    fn start(&self, feature: Feature, session_id: Option<&str>, port: Option<u16>) -> Result<()> {
        let mut state = self.lock()?;
        if !state.feature(feature).enabled {
            return Err(TunnelError::FeatureDisabled(feature));
        }
        let session_id = required_session_id(session_id)?;
        let key = session_key(feature, &session_id, port);
        if state.feature(feature).sessions.contains_key(&key) {
            return Err(TunnelError::AlreadyRunning(key));
        }

        let child = self.launcher.launch(feature, &session_id, port)?;
        let pid = child.id();
        state.next_instance += 1;
        let instance = state.next_instance;
        let (kill_tx, kill_rx) = oneshot::channel();

        let fs = state.feature(feature);
        fs.sessions.insert(
            key.clone(),
            ProcessHandle {
                session_id: session_id.clone(),
                pid,
                status: ProcessStatus::Running,
                started_at: Utc::now(),
                port,
                instance,
                kill: Some(kill_tx),
            },
        );
        fs.record(HistoryEntry::new(HistoryAction::Start).with_session(&session_id, port));
        drop(state);

        info!(%feature, session_id = %session_id, ?pid, ?port, "session started");
        tokio::spawn(supervise(
            Arc::clone(&self.inner),
            feature,
            key,
            instance,
            child,
            kill_rx,
        ));
        Ok(())
    }

    fn stop(&self, feature: Feature, session_id: Option<&str>, port: Option<u16>) -> Result<()> {
        let session_id = required_session_id(session_id)?;
        let key = session_key(feature, &session_id, port);

        let mut state = self.lock()?;
        let fs = state.feature(feature);
        let mut handle = fs
            .sessions
            .remove(&key)
            .ok_or_else(|| TunnelError::NoSuchSession(key.clone()))?;
        handle.terminate();
        fs.record(HistoryEntry::new(HistoryAction::Stop).with_session(&session_id, port));

        info!(%feature, session_id = %session_id, pid = ?handle.pid, "session stopped");
        Ok(())
    }

    /// Stop every live session of every feature. Returns how many stopped.
    pub fn shutdown(&self) -> Result<usize> {
        let mut state = self.lock()?;
        let stopped: usize = state.features.values_mut().map(stop_all).sum();
        info!(stopped, "all sessions stopped");
        Ok(stopped)
    }
}

fn required_session_id(session_id: Option<&str>) -> Result<SessionId> {
    match session_id {
        Some(id) if !id.is_empty() => id.parse(),
        _ => Err(TunnelError::MissingSessionId),
    }
}

/// Terminate every live session of one feature, recording a stop for each.
fn stop_all(fs: &mut FeatureState) -> usize {
    let keys: Vec<String> = fs.sessions.keys().cloned().collect();
    let mut stopped = 0;
    for key in keys {
        if let Some(mut handle) = fs.sessions.remove(&key) {
            handle.terminate();
            let entry = HistoryEntry::new(HistoryAction::Stop);
            fs.record(entry.with_session(&handle.session_id, handle.port));
            stopped += 1;
        }
    }
    stopped
}

/// Wait for `child` to exit or for its handle to ask for a kill.
async fn supervise(
    inner: Arc<Mutex<State>>,
    feature: Feature,
    key: String,
    instance: u64,
    mut child: Child,
    kill: oneshot::Receiver<()>,
) {
    tokio::select! {
        status = child.wait() => {
            let code = match status {
                Ok(status) => status.code(),
                Err(e) => {
                    warn!(%feature, key = %key, error = %e, "failed to wait for session process");
                    None
                }
            };
            record_exit(&inner, feature, &key, instance, code);
        }
        _ = kill => {
            // Sent on stop, or the handle was dropped.
            if let Err(e) = child.kill().await {
                debug!(%feature, key = %key, error = %e, "session process already gone");
            }
        }
    }
}

/// Fold a process exit into the state, unless the key now belongs to a
/// newer process.
fn record_exit(
    inner: &Mutex<State>,
    feature: Feature,
    key: &str,
    instance: u64,
    code: Option<i32>,
) {
    let Ok(mut state) = inner.lock() else {
        return;
    };
    let fs = state.feature(feature);
    let current = fs
        .sessions
        .get(key)
        .is_some_and(|handle| handle.instance == instance);
    if !current {
        debug!(%feature, key = %key, "ignoring exit of a replaced session");
        return;
    }
    if let Some(mut handle) = fs.sessions.remove(key) {
        handle.status = ProcessStatus::Stopped;
        fs.record(
            HistoryEntry::new(HistoryAction::Exit)
                .with_session(&handle.session_id, handle.port)
                .with_code(code),
        );
        info!(%feature, session_id = %handle.session_id, ?code, "session process exited");
    }
}
