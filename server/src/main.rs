use clap::Parser;
use jeux_server::client_registry::ClientRegistry;
use jeux_server::player_registry::PlayerRegistry;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Jeux game server: accepts connections, logs players in by name, and
/// referees invitations and games between them over a binary protocol.
#[derive(Parser, Debug)]
#[command(name = "jeux")]
struct Args {
    /// TCP port to listen on.
    #[arg(short = 'p', long = "port")]
    port: u16,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=info", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true),
        )
        .init();

    let args = Args::parse();

    let client_registry = Arc::new(ClientRegistry::new());
    let player_registry = Arc::new(PlayerRegistry::new());

    let listener = match TcpListener::bind(("0.0.0.0", args.port)).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(port = args.port, error = %err, "failed to bind listen socket");
            std::process::exit(1);
        }
    };
    tracing::info!(port = args.port, "listening");

    let mut sighup = signal(SignalKind::hangup()).expect("failed to install SIGHUP handler");

    tokio::select! {
        _ = sighup.recv() => {
            tracing::info!("received SIGHUP, shutting down");
        }
        _ = jeux_server::accept_loop(listener, client_registry.clone(), player_registry.clone()) => {}
    }

    client_registry.shutdown_all();
    client_registry.wait_for_empty().await;
    tracing::info!("shutdown complete");
}
