use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

mod loopback;
use loopback::LoopbackSurface;

use wirehost_core::bridge::{OwnerBridge, OwnerHandle};
use wirehost_core::config::{wirehost_dir, Advertisement, DriverConfig};
use wirehost_core::executor::SurfaceExecutor;
use wirehost_core::handlers::ServerState;
use wirehost_core::server::WireServer;

/// How long shutdown waits for the surface-owner thread.
const OWNER_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "wirehost-server")]
#[command(about = "Embedded JSON wire protocol automation server")]
struct Args {
    /// Listen port (overrides the config file)
    #[arg(short, long, env = "WIREHOST_PORT")]
    port: Option<u16>,

    /// Config file path (default: ~/.wirehost/config.json)
    #[arg(short, long, env = "WIREHOST_CONFIG")]
    config: Option<PathBuf>,

    /// Log to stderr instead of ~/.wirehost/wirehost-server.log
    #[arg(long)]
    log_stderr: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Setup logging
    let writer = if args.log_stderr {
        BoxMakeWriter::new(std::io::stderr)
    } else {
        let log_dir = wirehost_dir()?;
        BoxMakeWriter::new(tracing_appender::rolling::never(&log_dir, "wirehost-server.log"))
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(args.log_stderr);
    if args.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let mut config = match &args.config {
        Some(path) => DriverConfig::load_from(path)?,
        None => DriverConfig::load(),
    };
    if let Some(port) = args.port {
        config.port = port;
    }
    info!(port = config.port, "Starting wirehost-server");

    let (bridge, owner) = OwnerBridge::spawn(LoopbackSurface::new)?;
    let server = WireServer::new(ServerState::new(SurfaceExecutor::new(bridge)));

    let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port))).await?;
    let bound = listener.local_addr()?;

    let advertisement = config.advertised_addr(bound);
    let advertisement_path = Advertisement::default_path()?;
    advertisement.write_to(&advertisement_path)?;
    info!(
        ip = %advertisement.ip,
        port = advertisement.port,
        path = %advertisement_path.display(),
        "Address advertised"
    );

    let shutdown = CancellationToken::new();

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    #[cfg(unix)]
    let terminate = sigterm.recv();
    #[cfg(not(unix))]
    let terminate = std::future::pending::<Option<()>>();

    tokio::select! {
        result = server.run(listener, shutdown.clone()) => {
            if let Err(e) = result {
                warn!(error = %e, "Acceptor exited");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    shutdown.cancel();
    cleanup(server, owner, &advertisement_path).await;

    Ok(())
}

async fn cleanup(server: WireServer, owner: OwnerHandle, advertisement_path: &std::path::Path) {
    info!("Cleaning up");
    if let Err(e) = Advertisement::remove(advertisement_path) {
        warn!(error = %e, "Failed to remove address advertisement");
    }

    // The owner exits once the last bridge handle is gone.
    drop(server);
    let joined = tokio::time::timeout(
        OWNER_JOIN_TIMEOUT,
        tokio::task::spawn_blocking(move || owner.join()),
    )
    .await;
    match joined {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => warn!(error = %e, "Surface owner thread failed"),
        Ok(Err(e)) => warn!(error = %e, "Join task failed"),
        Err(_) => warn!("Surface owner thread still busy; not waiting"),
    }
    info!("Server stopped");
}
