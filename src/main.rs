use std::{str::FromStr, sync::Arc, time::Duration};

use clap::Parser;
use tracing_subscriber::{
    EnvFilter, Layer as _, filter::Directive, fmt::format::FmtSpan, layer::SubscriberExt,
    util::SubscriberInitExt as _,
};
use verdict_engine::{
    api::{self, AppState},
    config::Config,
    llm::{LlmGateway, LlmGatewayConfig},
    orchestrator::{ClarificationMode, Orchestrator},
    prelude::*,
    repository::{Repository, sql::SqlRepository},
    search::{SearchGateway, SearchGatewayConfig},
};

/// Turn a free-form problem statement into a ruling and an executable plan.
#[derive(Debug, Parser)]
#[clap(
    version,
    author,
    after_help = r#"
Environment Variables:
  LLM_PROVIDER, <PROVIDER>_API_KEY, LLM_MODEL (optional)
  SEARCH_ENABLED, SEARCH_PROVIDER (optional)
  DATABASE_URL, PORT, PIPELINE_TIMEOUT_MS

  These variables may be set in a standard `.env` file.
"#
)]
struct Opts {
    /// Whether to run the clarification stage before ruling. Disable to
    /// always go straight to a verdict.
    #[clap(long, default_value_t = true)]
    clarify: bool,
}

/// Our entry point, which can return an error. [`anyhow::Result`] will
/// automatically print a nice error message with optional backtrace.
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing.
    let directive = Directive::from_str("info").expect("built-in directive should be valid");
    let env_filter = EnvFilter::builder().with_default_directive(directive).from_env_lossy();

    let subscriber = tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_filter(env_filter);

    tracing_subscriber::registry().with(subscriber).init();

    real_main().await
}

/// Our real entry point.
#[instrument(level = "debug", name = "main", skip_all)]
async fn real_main() -> Result<()> {
    // Load environment variables from a `.env` file, if it exists.
    dotenvy::dotenv().ok();

    let opts = Opts::parse();
    debug!("Parsed options: {:?}", opts);

    let config = Config::from_env().context("failed to load configuration")?;
    let port = config.port;

    let llm_gateway_config = LlmGatewayConfig {
        provider: config.llm_provider,
        api_key: config.llm_api_key.clone(),
        model: config.llm_model.clone(),
        max_retries: 3,
        timeout: Duration::from_secs(5 * 60),
    };
    let llm = LlmGateway::new(llm_gateway_config).context("failed to build LLM gateway")?;

    let search = match config.search_provider {
        Some(kind) if config.search_enabled => {
            let client = reqwest::Client::new();
            let provider =
                verdict_engine::search::create_provider(kind, client).context("failed to build search provider")?;
            SearchGateway::new(provider, SearchGatewayConfig::default())
        }
        _ => SearchGateway::disabled(),
    };

    let clarification_mode = if opts.clarify {
        ClarificationMode::Enabled
    } else {
        ClarificationMode::Disabled
    };

    let orchestrator = Orchestrator::new(llm, search, clarification_mode, config.pipeline_timeout);

    let repository = SqlRepository::connect(&config.database_url)
        .await
        .context("failed to connect to the database")?;
    let repository: Arc<dyn Repository> = Arc::new(repository);

    let state = AppState {
        orchestrator: Arc::new(orchestrator),
        repository,
    };

    let app = api::router(state.clone());
    let addr = format!("0.0.0.0:{port}");
    info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(&addr).await.context("failed to bind listener")?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    state.repository.close().await;
    Ok(())
}

/// Wait for either Ctrl-C or SIGTERM, so the process shuts down cleanly
/// under an orchestrator like systemd or Kubernetes.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
