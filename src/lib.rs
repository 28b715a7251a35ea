//! # relay-tunnel
//!
//! Shell and HTTP tunnels to hosts without inbound connectivity, relayed
//! through a realtime database used as an ordered mailbox.
//!
//! Both ends of a session talk only to the relay store. Every session owns
//! three channels under `sessions/<id>/<feature>`: `input` (client to
//! server), `output` (server to client) and `state`.
//!
//! ## Features
//!
//! - **Shell tunnel**: a PTY-backed shell bridged to a raw-mode console
//! - **HTTP tunnel**: a local reverse proxy whose requests are replayed
//!   against ports on the remote host
//! - **Session manager**: supervised tunnel processes with an admin API
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use relay_tunnel::relay::{FirebaseStore, RelayStore, SessionChannels};
//! use relay_tunnel::session::Feature;
//! use relay_tunnel::tunnel::http::HttpForwarder;
//!
//! #[tokio::main]
//! async fn main() -> relay_tunnel::Result<()> {
//!     relay_tunnel::logging::try_init().ok();
//!
//!     let store: Arc<dyn RelayStore> =
//!         Arc::new(FirebaseStore::new("https://example.firebaseio.com", None)?);
//!     let channels = SessionChannels::new(store, Feature::Http, &"lab".parse()?);
//!
//!     // Answer relayed requests against localhost until the relay goes away.
//!     HttpForwarder::new(channels, "localhost")?.run().await
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod manage;
pub mod pty;
pub mod relay;
pub mod session;
pub mod tunnel;

// Re-export commonly used types
pub use error::{Result, TunnelError};
pub use manage::{SelfLauncher, SessionOrchestrator};
pub use pty::{NativePty, PtySize};
pub use relay::{FirebaseStore, MemoryStore, RelayChannel, RelayStore, SessionChannels};
pub use session::{Feature, SessionId};
pub use tunnel::http::{HttpForwarder, ProxyClient};
pub use tunnel::shell::{ShellClient, ShellServer};
