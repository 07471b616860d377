use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use chatters_auth::JwtAuthority;
use chatters_server::metrics::install_recorder;
use chatters_server::{ChattersServer, ServerConfig};
use chatters_settings::{ChattersSettings, load_settings, load_settings_from_path};
use chatters_store::{Database, SqliteStore};
use chatters_telemetry::{TelemetryConfig, init_telemetry};

/// Real-time chat backend.
#[derive(Debug, Parser)]
#[command(name = "chatters", version, about)]
struct Cli {
    /// Settings file (defaults to `$CHATTERS_CONFIG` or `./chatters.json`).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Override the bind address.
    #[arg(long)]
    host: Option<String>,
    /// Override the listen port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = resolve_settings(&cli)?;

    let telemetry = TelemetryConfig::from_levels(
        &settings.logging.level,
        settings
            .logging
            .modules
            .iter()
            .map(|(module, level)| (module.as_str(), level.as_str())),
        settings.logging.json,
    )?;
    init_telemetry(&telemetry)?;

    if settings.auth.uses_default_secret() {
        warn!("auth.jwtSecret is the built-in placeholder; set CHATTERS_JWT_SECRET in production");
    }

    let metrics = match install_recorder() {
        Ok(handle) => Some(handle),
        Err(error) => {
            warn!(%error, "metrics recorder unavailable, /metrics disabled");
            None
        }
    };

    let db = Database::open(Path::new(&settings.storage.database_path))
        .with_context(|| format!("opening {}", settings.storage.database_path))?;
    let store = SqliteStore::new(db);

    let authority = Arc::new(JwtAuthority::new(
        settings.auth.jwt_secret.as_bytes(),
        Duration::from_secs(settings.auth.token_ttl_hours.saturating_mul(3600)),
    ));

    let config = ServerConfig::from_settings(&settings);
    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| format!("creating {}", config.upload_dir.display()))?;

    let server = ChattersServer::new(config, store, authority, metrics);
    let (addr, server_task) = server.listen().await.context("binding listener")?;
    info!(%addr, "chatters ready");

    tokio::signal::ctrl_c()
        .await
        .context("listening for ctrl+c")?;
    info!("shutting down");

    server.shutdown_gracefully(server_task, None).await;
    Ok(())
}

fn resolve_settings(cli: &Cli) -> anyhow::Result<ChattersSettings> {
    let mut settings = match &cli.config {
        Some(path) => load_settings_from_path(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => load_settings().context("loading settings")?,
    };
    if let Some(host) = &cli.host {
        settings.server.host.clone_from(host);
    }
    if let Some(port) = cli.port {
        settings.server.port = port;
    }
    settings.validate()?;
    Ok(settings)
}
