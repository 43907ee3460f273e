use clap::{Parser, Subcommand};
use shardplane::config::{ControlPlaneConfig, RouterConfig};
use shardplane::control_plane::ControlPlane;
use shardplane::events::{TracingEventSink, spawn_sink_forwarder};
use shardplane::router::{HttpShardMapSource, RouterCache};
use shardplane::web::{control_plane_router, routing_router};
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, event};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "shardplane", version, about = "Shard placement and failover control plane")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control-plane HTTP service
    ControlPlane {
        /// Port to listen on (overrides PORT)
        #[arg(long)]
        port: Option<u16>,
        /// Events kept in the event log (overrides EVENT_LOG_CAPACITY)
        #[arg(long)]
        event_log_capacity: Option<usize>,
        /// Load the reference tenants, fleets and shards
        #[arg(long)]
        seed_demo: bool,
    },
    /// Run a data-plane router backed by a remote control plane
    Router {
        /// Port to listen on (overrides PORT)
        #[arg(long)]
        port: Option<u16>,
        /// Control-plane base URL (overrides CONTROL_PLANE_URL)
        #[arg(long)]
        control_plane_url: Option<String>,
        /// Shard-map cache TTL in milliseconds (overrides ROUTER_CACHE_TTL_MS)
        #[arg(long)]
        cache_ttl_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match Cli::parse().command {
        Command::ControlPlane {
            port,
            event_log_capacity,
            seed_demo,
        } => {
            let mut config = ControlPlaneConfig::from_env()?.seed_demo(seed_demo);
            if let Some(port) = port {
                config.listen_addr.set_port(port);
            }
            if let Some(capacity) = event_log_capacity {
                config = config.event_log_capacity(capacity);
            }
            run_control_plane(config).await
        }
        Command::Router {
            port,
            control_plane_url,
            cache_ttl_ms,
        } => {
            let mut config = RouterConfig::from_env()?;
            if let Some(port) = port {
                config.listen_addr.set_port(port);
            }
            if let Some(url) = control_plane_url {
                config = config.control_plane_url(url);
            }
            if let Some(ttl_ms) = cache_ttl_ms {
                config = config.cache_ttl(Duration::from_millis(ttl_ms));
            }
            run_router(config).await
        }
    }
}

async fn run_control_plane(config: ControlPlaneConfig) -> anyhow::Result<()> {
    let control = ControlPlane::bootstrap(&config).await?;
    spawn_sink_forwarder(&control.events, Arc::new(TracingEventSink));

    let app = control_plane_router(control);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    event!(Level::INFO, addr = %config.listen_addr, "control plane listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn run_router(config: RouterConfig) -> anyhow::Result<()> {
    config.validate()?;
    let source = Arc::new(HttpShardMapSource::new(&config.control_plane_url));
    let cache = Arc::new(RouterCache::from_config(source, &config));

    let app = routing_router(cache);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    event!(
        Level::INFO,
        addr = %config.listen_addr,
        control_plane = %config.control_plane_url,
        ttl_ms = config.cache_ttl.as_millis() as u64,
        "router listening"
    );
    axum::serve(listener, app).await?;
    Ok(())
}
