//! fbcast-server entry point.
//!
//! ```text
//! fbcast-server                  Serve with fbcast.toml (or defaults)
//! fbcast-server --config <path>  Load a custom config TOML
//! fbcast-server --port <port>    Override the listener port
//! fbcast-server --gen-config     Write default config to stdout
//! ```

use std::path::PathBuf;
use std::sync::atomic::Ordering;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use fbcast_core::{Bridge, DisconnectReason, SessionEvent};
use fbcast_server::config::ServerConfig;
use fbcast_server::engine::DemoEngine;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "fbcast-server", about = "Serve a frame-buffer UI to browser viewers")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "fbcast.toml")]
    config: PathBuf,

    /// Listener port, overriding the config file.
    #[arg(short, long)]
    port: Option<u16>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&ServerConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = ServerConfig::load(&cli.config);
    if let Some(port) = cli.port {
        config.network.port = port;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("fbcast-server v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "canvas: {}x{} @ {} bpp",
        config.display.width, config.display.height, config.display.color_depth
    );
    info!("max viewers: {}", config.network.max_sessions);

    let (bridge, events) = Bridge::new(config.to_bridge_config()?)?;
    let assets = config.assets.load()?;

    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("listening on http://{addr}/");

    tokio::spawn(log_events(events));

    let engine = DemoEngine::new(&bridge);
    let engine_running = engine.stop_handle();
    let engine_task = tokio::spawn(engine.run());

    let pipeline = bridge.accept_pipeline(assets);
    let result = tokio::select! {
        result = pipeline.run(listener) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
            Ok(())
        }
    };

    engine_running.store(false, Ordering::SeqCst);
    let _ = engine_task.await;
    let closed = bridge.shutdown().await;
    info!(closed, "sessions closed");

    if let Err(e) = result {
        // The listener is gone; exit non-zero so the supervisor restarts us.
        error!("fatal: {e}");
        return Err(e.into());
    }
    Ok(())
}

/// Log session lifecycle events until the bridge goes away.
async fn log_events(mut events: mpsc::UnboundedReceiver<SessionEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Connected { id, peer } => {
                debug!(session = %id, peer = peer.as_deref().unwrap_or("-"), "event: connected");
            }
            SessionEvent::Disconnected { id, reason } => match reason {
                DisconnectReason::External => debug!(session = %id, "event: viewer closed"),
                DisconnectReason::Internal => debug!(session = %id, "event: server closed"),
                DisconnectReason::Error => warn!(session = %id, "event: connection error"),
            },
            SessionEvent::Unhandled { id, opcode } => {
                debug!(session = %id, ?opcode, "event: unhandled message");
            }
        }
    }
}
