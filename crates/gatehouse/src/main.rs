//! The `gatehouse` binary.
//!
//! ```bash
//! gatehouse --mode release --port 8080
//! GATEHOUSE__LIMITER__BURST=10 gatehouse --config /etc/gatehouse/config.toml
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use gatehouse::config::{BuildMode, ConfigLoader, GatehouseConfig};
use gatehouse::middleware::stages::MemoryTokenStore;
use gatehouse::routes::DemoRoutes;
use gatehouse::server::{App, Server, ServerConfig, ShutdownSignal};
use gatehouse::telemetry::{describe_metrics, init_logging};

const ENV_PREFIX: &str = "GATEHOUSE";
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Parser)]
#[command(name = "gatehouse", version, about = "Gatehouse HTTP service")]
struct Cli {
    /// Build mode: develop or release.
    #[arg(long, env = "GATEHOUSE_MODE")]
    mode: Option<BuildMode>,

    /// Listen port.
    #[arg(long, env = "GATEHOUSE_PORT")]
    port: Option<u16>,

    /// Configuration file. Missing is fine.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,
}

fn load_config(cli: &Cli) -> anyhow::Result<GatehouseConfig> {
    let mut loader = ConfigLoader::new().with_dotenv();
    if let Some(mode) = cli.mode {
        loader = loader.with_mode(mode);
    }
    let mut cfg = loader
        .with_optional_file(&cli.config)?
        .with_env_prefix(ENV_PREFIX)
        .resolve()?;

    if let Some(mode) = cli.mode {
        cfg.build = mode;
    }
    if let Some(port) = cli.port {
        cfg.server.port = port.to_string();
    }
    cfg.validate().context("invalid configuration")?;
    Ok(cfg)
}

fn spawn_token_purge(store: Arc<MemoryTokenStore>, shutdown: &ShutdownSignal) {
    let stop = shutdown.child_token();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PURGE_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let purged = store.purge_expired();
                    if purged > 0 {
                        tracing::debug!(purged, "expired csrf tokens removed");
                    }
                }
                () = stop.cancelled() => break,
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = load_config(&cli)?;

    init_logging(&cfg.logging.to_log_config()).context("failed to initialize logging")?;
    describe_metrics();

    let workers = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
    tracing::info!(
        mode = cfg.build.as_str(),
        addr = %cfg.listen_addr(),
        workers,
        "startup"
    );

    let shutdown = ShutdownSignal::with_os_signals();
    let store = Arc::new(MemoryTokenStore::new());
    spawn_token_purge(Arc::clone(&store), &shutdown);

    let app = App::from_config(&cfg, store, &[&DemoRoutes]);
    let server = Server::builder()
        .config(ServerConfig::from(&cfg))
        .app(app)
        .build();

    server.run_with_shutdown(shutdown).await?;
    tracing::info!("shutdown complete");
    Ok(())
}
