//! Storefront Insights: e-commerce analytics metrics, a two-tier metrics
//! cache and threshold alerting behind a REST API.
//!
//! Main entry point that wires the subsystems and starts the server.

use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::{Duration, Instant};
use storefront_alerts::AlertsManager;
use storefront_analytics::{ClickHouseEventStore, MetricsCalculator, MetricsService};
use storefront_api::{ApiServer, AppState};
use storefront_cache::{MetricsCache, RedisBackend, Timeouts};
use storefront_core::clock::{system_clock, Clock};
use storefront_core::config::AppConfig;
use storefront_core::MetricsQueryParams;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "storefront-insights")]
#[command(about = "E-commerce analytics metrics, caching and alerting service")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "STOREFRONT_INSIGHTS__NODE_ID")]
    node_id: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "STOREFRONT_INSIGHTS__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Run with the local cache tier only
    #[arg(long, default_value_t = false)]
    no_redis: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the REST API (default)
    Serve,
    /// Compute metrics for one window and print them as JSON
    Metrics {
        /// Window start, RFC 3339 or YYYY-MM-DD
        #[arg(long)]
        start: String,
        /// Window end, RFC 3339 or YYYY-MM-DD (whole day)
        #[arg(long)]
        end: String,
        #[arg(long, default_value_t = false)]
        advanced: bool,
        #[arg(long)]
        user_id: Option<String>,
        #[arg(long)]
        session_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storefront_insights=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if cli.no_redis {
        config.redis.enabled = false;
    }

    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        redis = config.redis.enabled,
        clickhouse = %config.clickhouse.url,
        "Configuration loaded"
    );

    let clock = system_clock();
    let cache = Arc::new(build_cache(&config, clock.clone()).await);
    let store = Arc::new(ClickHouseEventStore::new(&config.clickhouse));
    let service = Arc::new(MetricsService::new(MetricsCalculator::new(store), cache.clone()));

    match cli.command.unwrap_or(Command::Serve) {
        Command::Metrics {
            start,
            end,
            advanced,
            user_id,
            session_id,
        } => {
            let mut params = MetricsQueryParams::from_bounds(&start, &end)?;
            params.user_id = user_id;
            params.session_id = session_id;
            let metrics = service.get_metrics(&params, advanced, None).await;
            println!("{}", serde_json::to_string_pretty(&metrics)?);
            Ok(())
        }
        Command::Serve => serve(config, service, cache, clock).await,
    }
}

async fn build_cache(config: &AppConfig, clock: Arc<dyn Clock>) -> MetricsCache {
    if !config.redis.enabled {
        info!("Distributed cache disabled, using local tier only");
        return MetricsCache::local_only(&config.cache, clock);
    }

    let backend = match RedisBackend::open(&config.redis) {
        Ok(backend) => backend,
        Err(e) => {
            error!(error = %e, "Failed to open Redis client, using local tier only");
            return MetricsCache::local_only(&config.cache, clock);
        }
    };

    let timeouts = Timeouts::from_config(&config.redis);
    match tokio::time::timeout(timeouts.op, backend.ping()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Redis unreachable at startup, entries will fall back to local tier"),
        Err(_) => warn!("Redis ping timed out at startup, entries will fall back to local tier"),
    }

    MetricsCache::with_distributed(&config.cache, Arc::new(backend), timeouts, clock)
}

async fn serve(
    config: AppConfig,
    service: Arc<MetricsService>,
    cache: Arc<MetricsCache>,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<()> {
    let alerts = Arc::new(AlertsManager::from_settings(&config.alerts, clock));

    let state = AppState {
        metrics: service,
        alerts,
        node_id: config.node_id.clone(),
        start_time: Instant::now(),
    };
    let api_server = ApiServer::new(config, state);

    if let Err(e) = api_server.start_metrics() {
        error!(error = %e, "Failed to start metrics exporter");
    }

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            cache.maintenance().await;
        }
    });

    info!("Storefront Insights is ready to serve traffic");

    api_server.start_http().await
}
