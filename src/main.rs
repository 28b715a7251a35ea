//! relay-tunnel binary entry point.

use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;

use relay_tunnel::cli::{self, Command};
use relay_tunnel::config::Config;
use relay_tunnel::logging;
use relay_tunnel::manage::{self, ManageState, SelfLauncher, SessionOrchestrator};
use relay_tunnel::relay::{FirebaseStore, RelayStore, SessionChannels};
use relay_tunnel::session::{Feature, SessionId};
use relay_tunnel::tunnel::http::{HttpForwarder, ProxyClient, ProxySettings};
use relay_tunnel::tunnel::shell::{ShellClient, ShellServer};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

type BoxError = Box<dyn Error + Send + Sync>;

fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {}", e);
            eprintln!("Try 'relay-tunnel --help' for more information.");
            return ExitCode::FAILURE;
        }
    };

    if args.help {
        cli::print_help();
        return ExitCode::SUCCESS;
    }

    if args.version {
        cli::print_version();
        return ExitCode::SUCCESS;
    }

    let Some(command) = args.command.clone() else {
        cli::print_help();
        return ExitCode::FAILURE;
    };

    let config = match Config::load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    logging::init_with_filter(Some(config.log_filter()));

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "failed to start runtime");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(run(command, config));
    // The console reader may still be blocked on stdin.
    runtime.shutdown_background();

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!(error = %e, "relay-tunnel failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, config: Config) -> Result<u8, BoxError> {
    info!("relay-tunnel v{}", env!("CARGO_PKG_VERSION"));

    let store: Arc<dyn RelayStore> = Arc::new(
        FirebaseStore::new(config.relay_url()?, config.relay.auth.clone())?
            .with_reconnect_delay(config.reconnect_delay()),
    );

    match command {
        Command::Serve {
            feature,
            session_id,
        } => serve(store, feature, &session_id, &config).await,
        Command::Connect {
            feature,
            session_id,
        } => connect(store, feature, &session_id, &config).await,
        Command::Manage { .. } => {
            run_manager(&config).await?;
            Ok(0)
        }
    }
}

/// Server role: the process the manager launches as `<feature> <id>`.
async fn serve(
    store: Arc<dyn RelayStore>,
    feature: Feature,
    session_id: &SessionId,
    config: &Config,
) -> Result<u8, BoxError> {
    let channels = SessionChannels::new(store, feature, session_id);
    info!(%feature, session_id = %session_id, "serving session");

    match feature {
        Feature::Shell => {
            let code = ShellServer::new(channels, config.shell_program(), config.pty_size())
                .run()
                .await?;
            info!(code, "shell exited");
            Ok(exit_status(code))
        }
        Feature::Http => {
            let forwarder = HttpForwarder::new(channels, config.forward.host.clone())?
                .with_port(config.forward.port);
            tokio::select! {
                result = forwarder.run() => result?,
                _ = shutdown_signal() => {}
            }
            Ok(0)
        }
    }
}

/// Client role, run next to the user.
async fn connect(
    store: Arc<dyn RelayStore>,
    feature: Feature,
    session_id: &SessionId,
    config: &Config,
) -> Result<u8, BoxError> {
    let channels = SessionChannels::new(store, feature, session_id);

    match feature {
        Feature::Shell => {
            let exit = ShellClient::new(channels).run().await?;
            info!(?exit, "detached from shell");
            Ok(0)
        }
        Feature::Http => {
            let addr = config.proxy_addr()?;
            let listener = TcpListener::bind(addr).await?;
            let client = ProxyClient::new(channels, ProxySettings::from_config(config));
            client.serve(listener, shutdown_signal()).await?;
            Ok(0)
        }
    }
}

async fn run_manager(config: &Config) -> Result<(), BoxError> {
    let launcher = SelfLauncher::from_config(config)?;
    let orchestrator = SessionOrchestrator::new(Arc::new(launcher));

    for entry in &config.manage.autostart {
        if let Err(e) = orchestrator.set_feature(
            entry.feature,
            manage::Action::Start,
            Some(entry.session_id.as_str()),
            entry.port,
        ) {
            warn!(
                feature = %entry.feature,
                session_id = %entry.session_id,
                error = %e,
                "autostart failed"
            );
        }
    }

    let mut state = ManageState::new(orchestrator.clone());
    if let Some(ref path) = config.manage.page {
        match tokio::fs::read_to_string(path).await {
            Ok(page) => state = state.with_page(page),
            Err(e) => warn!(path = %path.display(), error = %e, "admin page not loaded"),
        }
    }

    let listener = TcpListener::bind(config.manage_addr()?).await?;
    let served = manage::serve(listener, state, shutdown_signal()).await;

    let stopped = orchestrator.shutdown()?;
    info!(stopped, "session manager stopped");
    Ok(served?)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

/// Map a shell exit code onto a process exit status.
fn exit_status(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}
