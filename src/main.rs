use clap::Parser;
use gemma_proxy::{build_router, AppState, ProxyConfig, SharedLogger};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "gemma-proxy",
    about = "Gemini-style API front for an OpenAI-compatible Gemma backend",
    version
)]
struct Cli {
    /// Path to config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Backend base URL (overrides config)
    #[arg(long)]
    backend_url: Option<String>,

    /// Log file path
    #[arg(long, default_value = "gemma-proxy.log")]
    log_file: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gemma_proxy=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = ProxyConfig::find_and_load(cli.config.as_deref())?;

    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(url) = cli.backend_url {
        config.backend.base_url = url;
    }

    let logger = SharedLogger::new(&cli.log_file)?;

    // Validate config eagerly: the model table must be a bijection and any
    // configured API key env var must be set.
    let models = config.model_map()?;
    let _api_key = config.resolve_api_key()?;

    info!("gemma-proxy v{}", env!("CARGO_PKG_VERSION"));
    info!("  Backend:  {}", config.backend.base_url);
    info!("  Port:     {}", config.port);
    info!("  Models:   {} mapped", models.public_ids().count());
    info!("  Log file: {}", cli.log_file.display());

    logger.info(
        "startup",
        format!(
            "Starting gemma-proxy backend={} port={}",
            config.backend.base_url, config.port
        ),
    );

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(300))
        .build()?;

    let state = Arc::new(AppState {
        config: config.clone(),
        models,
        client,
        logger,
    });

    let app = build_router(state);
    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
