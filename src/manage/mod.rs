//! Session orchestration.
//!
//! The manager keeps one tunnel endpoint process per live session, a
//! per-feature enable flag and an action history, and exposes them
//! through a small admin HTTP API.

pub mod api;
mod launcher;
mod orchestrator;
mod state;

pub use api::{create_router, serve, ManageState};
pub use launcher::{Launcher, SelfLauncher};
pub use orchestrator::SessionOrchestrator;
pub use state::{
    session_key, Action, FeatureFlags, FeatureStatus, HistoryAction, HistoryEntry, ProcessHandle,
    ProcessStatus, SessionSummary, StatusSnapshot, HISTORY_LIMIT, HISTORY_VISIBLE,
};
