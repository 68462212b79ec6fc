use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use bridge_server::{logging, routes, AppContext};
use bridge_state::{spawn_ingest_loop, ProcessExecutor};
use matter_client::{ControllerConfig, ControllerProcess, WsClient, WsConfig};

/// HTTP bridge over a Matter device mesh.
///
/// Launches (or attaches to) a Matter controller, mirrors the mesh into a
/// queryable snapshot, and serves lights, sensors, aliases, callbacks,
/// commands, and commissioning over a small JSON API.
#[derive(Parser, Debug)]
#[command(name = "bridge-server", version)]
struct Args {
    /// HTTP listen port; a launched controller takes the next port up
    #[arg(short, long, default_value = "8080", env = "BRIDGE_PORT")]
    port: u16,

    /// Directory for all persisted bridge and controller state
    #[arg(short, long, default_value = "./bridge-data", env = "BRIDGE_STORAGE_DIR")]
    storage_dir: PathBuf,

    /// Program to launch as the controller subprocess
    #[arg(long, default_value = "python3")]
    controller_program: String,

    /// Attach to an already-running controller at this WebSocket URL
    /// instead of launching one
    #[arg(long)]
    controller_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let args = Args::parse();

    std::fs::create_dir_all(&args.storage_dir)
        .with_context(|| format!("could not create {}", args.storage_dir.display()))?;

    let matter_port = args
        .port
        .checked_add(1)
        .context("listen port leaves no room for the controller port")?;

    let controller = match &args.controller_url {
        Some(url) => {
            info!("attaching to external controller at {url}");
            None
        }
        None => {
            let storage = args.storage_dir.join("controller");
            std::fs::create_dir_all(&storage)
                .with_context(|| format!("could not create {}", storage.display()))?;
            let mut config = ControllerConfig::new(storage.to_string_lossy(), matter_port);
            config.program = args.controller_program.clone();
            Some(ControllerProcess::spawn(&config).context("failed to launch controller")?)
        }
    };

    let url = args
        .controller_url
        .clone()
        .unwrap_or_else(|| format!("ws://127.0.0.1:{matter_port}/ws"));

    let client = match WsClient::connect(WsConfig::new(&url)).await {
        Ok(client) => Arc::new(client),
        Err(e) => {
            // Never leave an orphaned controller behind a failed startup.
            if let Some(controller) = controller {
                controller.terminate().await;
            }
            return Err(e).with_context(|| format!("could not reach controller at {url}"));
        }
    };

    let ctx = Arc::new(AppContext::hydrate(
        &args.storage_dir,
        client.clone(),
        Arc::new(ProcessExecutor),
    ));

    // Readers get a committed snapshot before the server accepts traffic.
    ctx.ingest_context().rebuild_and_dispatch();
    let ingest = spawn_ingest_loop(ctx.ingest_context(), client.subscribe_changes());

    let addr: SocketAddr = ([0, 0, 0, 0], args.port).into();
    info!("serving on http://{addr}");
    let (_bound, server) =
        warp::serve(routes::routes(ctx.clone())).bind_with_graceful_shutdown(addr, async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        });
    server.await;

    // Ordered teardown: stop ingesting, close the session, then the child.
    ingest.shutdown().await;
    client.close().await;
    if let Some(controller) = controller {
        controller.terminate().await;
    }
    info!("bridge stopped");
    Ok(())
}
