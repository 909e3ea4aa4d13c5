use std::path::PathBuf;
use std::sync::Arc;

use bricklayer_engine::event::EventManager;
use bricklayer_engine::world::{BlockCatalog, Level, LevelMeta, PlayerRef, WorldError};
use bricklayer_server::config::ServerConfig;
use bricklayer_server::net::ServerContext;
use bricklayer_server::{block, dashboard, extensions, persistence};
use uuid::Uuid;

#[tokio::main]
async fn main() {
    let config_path: PathBuf = std::env::args()
        .skip_while(|a| a != "--config")
        .nth(1)
        .unwrap_or_else(|| "config.json".into())
        .into();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut config = match ServerConfig::load_or_create(&config_path) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };
    // Command-line flags win over the file.
    if let Some(bind) = std::env::args().skip_while(|a| a != "--bind").nth(1) {
        config.bind = bind;
    }
    if let Some(port) = std::env::args()
        .skip_while(|a| a != "--dashboard-port")
        .nth(1)
        .and_then(|s| s.parse().ok())
    {
        config.dashboard_port = port;
    }
    if let Some(dir) = std::env::args().skip_while(|a| a != "--levels").nth(1) {
        config.level_dir = dir.into();
    }

    tracing::info!("{} -- Bricklayer server {}", config.name, env!("CARGO_PKG_VERSION"));

    // ── Catalog and extensions ───────────────────────────────────────────
    let events = Arc::new(EventManager::new());
    let (catalog, _report) = match block::build_catalog(extensions::builtin(), &config.disabled_extensions, &events) {
        Ok(built) => built,
        Err(e) => {
            tracing::error!("Failed to build block catalog: {}", e);
            std::process::exit(1);
        }
    };

    // ── Levels: saved ones, or a fresh lobby ─────────────────────────────
    let level_dir = config.level_dir.clone();
    let ctx = Arc::new(ServerContext::new(config, Arc::clone(&catalog), events));
    let levels = match persistence::load_all(&level_dir, &catalog) {
        Ok(levels) => levels,
        Err(e) => {
            tracing::error!("Failed to load levels: {:#}", e);
            Vec::new()
        }
    };
    if levels.is_empty() {
        tracing::info!("No saved levels found, generating a lobby");
        match lobby(&ctx.config, catalog) {
            Ok(level) => {
                ctx.authority.open(level);
            }
            Err(e) => {
                tracing::error!("Failed to generate the lobby: {}", e);
                std::process::exit(1);
            }
        }
    }
    for level in levels {
        ctx.authority.open(level);
    }

    // Start live dashboard (non-blocking, runs on its own tasks).
    let dash = Arc::clone(&ctx);
    tokio::spawn(async move {
        dashboard::server::start(Arc::clone(&dash), dash.config.dashboard_port).await;
    });

    // ── Periodic autosave ────────────────────────────────────────────────
    if let Some(period) = ctx.config.autosave_interval() {
        let authority = Arc::clone(&ctx.authority);
        let save_dir = level_dir.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await; // first tick is immediate, skip it
            loop {
                interval.tick().await;
                tracing::info!("Autosaving...");
                let authority = Arc::clone(&authority);
                let dir = save_dir.clone();
                // Compression and disk I/O stay off the async workers.
                match tokio::task::spawn_blocking(move || persistence::save_dirty(&authority, &dir)).await {
                    Ok(Ok(n)) => tracing::info!("Autosave complete: {} levels", n),
                    Ok(Err(e)) => tracing::error!("Autosave failed: {:#}", e),
                    Err(e) => tracing::error!("Autosave task failed: {}", e),
                }
            }
        });
    }

    // ── Start listener with graceful shutdown ────────────────────────────
    let bind_addr = ctx.config.bind.clone();
    tokio::select! {
        result = bricklayer_server::net::listener::run(Arc::clone(&ctx), &bind_addr) => {
            if let Err(e) = result {
                tracing::error!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Ctrl+C received, shutting down...");
        }
    }

    // ── Save on shutdown ─────────────────────────────────────────────────
    tracing::info!("Saving levels before exit...");
    match persistence::save_dirty(&ctx.authority, &level_dir) {
        Ok(n) => tracing::info!("Shutdown save complete: {} levels written", n),
        Err(e) => tracing::error!("Shutdown save failed: {:#}", e),
    }
}

/// The level a fresh install starts with, owned by the server itself.
fn lobby(config: &ServerConfig, catalog: Arc<BlockCatalog>) -> Result<Level, WorldError> {
    let creator = PlayerRef {
        uuid: Uuid::nil(),
        username: config.name.clone(),
    };
    let mut meta = LevelMeta::new("Lobby", creator);
    meta.description = config.description.clone();
    Level::generate(meta, config.level_width, config.level_height, catalog)
}
