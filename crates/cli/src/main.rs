use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand};
use config::{
    github_app_from_env, require_secret, secret_from_env, Endpoints, FinderConfig,
    COHERE_API_KEY_ENV, GITHUB_APP_CLIENT_ID_ENV, GITHUB_APP_PRIVATE_KEY_ENV, GITHUB_TOKEN_ENV,
    OPENAI_API_KEY_ENV, WEBHOOK_SECRET_ENV,
};
use iam_catalog::ActionCatalog;
use iam_clients::{CohereReranker, GithubClient, OpenAiClient};
use iam_pipeline::limits::concurrency_from_env;
use iam_pipeline::{is_valid_action, PipelineConfig, PolicyPipeline};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

mod config;
mod http_api;
mod server_security;
mod webhook;

#[derive(Parser)]
#[command(name = "iam-finder")]
#[command(about = "Infer least-privilege AWS IAM policies from repository source code", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for the policy)
    #[arg(long, global = true)]
    quiet: bool,

    /// TOML config file (overrides IAM_FINDER_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a policy for a GitHub repository branch
    Generate(GenerateArgs),

    /// Inspect the AWS action catalog
    Catalog(CatalogArgs),

    /// Serve the GitHub webhook (GET /healthz, POST /events)
    ServeHttp(ServeArgs),
}

#[derive(Args)]
struct GenerateArgs {
    /// Repository as owner/name
    #[arg(long)]
    repository: String,

    #[arg(long, default_value = "main")]
    branch: String,

    /// Keep at most this many relevant files
    #[arg(long)]
    top_n: Option<usize>,

    /// Minimum relevance score, inclusive
    #[arg(long)]
    threshold: Option<f64>,

    /// Files extracted at the same time (1-32)
    #[arg(long)]
    concurrency: Option<usize>,

    /// Catalog URL or local file
    #[arg(long)]
    catalog: Option<String>,

    /// Also write the policy to this file
    #[arg(long)]
    out: Option<PathBuf>,

    /// Print the run report as JSON to stderr
    #[arg(long)]
    report: bool,
}

#[derive(Args)]
struct CatalogArgs {
    /// Catalog URL or local file
    #[arg(long)]
    catalog: Option<String>,

    /// List this service's actions
    #[arg(long)]
    service: Option<String>,

    /// Check one action of --service
    #[arg(long, requires = "service")]
    action: Option<String>,
}

#[derive(Args)]
struct ServeArgs {
    /// Bind address, e.g. 127.0.0.1:8080
    #[arg(long)]
    bind: Option<String>,

    /// Allow binding to non-loopback addresses (requires IAM_FINDER_WEBHOOK_SECRET)
    #[arg(long)]
    public: bool,

    /// Catalog URL or local file
    #[arg(long)]
    catalog: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    // reqwest and hyper are noisy at debug level.
    if !cli.verbose {
        builder.filter_module("hyper", log::LevelFilter::Warn);
        builder.filter_module("reqwest", log::LevelFilter::Warn);
    }
    builder.target(env_logger::Target::Stderr).init();

    let config = FinderConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Generate(args) => run_generate(args, config).await?,
        Commands::Catalog(args) => run_catalog(args, config).await?,
        Commands::ServeHttp(args) => serve_http(args, config).await?,
    }

    Ok(())
}

fn resolve_pipeline_config(
    config: &FinderConfig,
    top_n: Option<usize>,
    threshold: Option<f64>,
    concurrency: Option<usize>,
) -> Result<PipelineConfig> {
    let effective = FinderConfig {
        pipeline: PipelineConfig {
            top_n: top_n.or(config.pipeline.top_n),
            relevance_threshold: threshold.unwrap_or(config.pipeline.relevance_threshold),
            concurrency: concurrency
                .unwrap_or_else(|| concurrency_from_env(config.pipeline.concurrency)),
        },
        ..config.clone()
    };
    effective.validate().map_err(anyhow::Error::msg)?;
    Ok(effective.pipeline)
}

async fn load_catalog(config: &FinderConfig, overridden: Option<&str>) -> Result<ActionCatalog> {
    let source = config.catalog_source(overridden);
    log::info!("Loading action catalog source={source}");
    let client = reqwest::Client::builder()
        .user_agent(concat!("iam-finder/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;
    let catalog = source
        .load(&client)
        .await
        .with_context(|| format!("Failed to load action catalog from {source}"))?;
    log::info!(
        "Action catalog loaded service_count={} action_count={}",
        catalog.len(),
        catalog.action_count()
    );
    Ok(catalog)
}

fn build_pipeline(
    config: &FinderConfig,
    endpoints: &Endpoints,
    catalog: ActionCatalog,
    pipeline_config: PipelineConfig,
) -> Result<PolicyPipeline> {
    let reranker = CohereReranker::new(require_secret(COHERE_API_KEY_ENV)?)?
        .with_api_url(&endpoints.cohere)
        .with_model(config.models.rerank_model.clone());
    let model = OpenAiClient::new(require_secret(OPENAI_API_KEY_ENV)?)?
        .with_api_url(&endpoints.openai)
        .with_model(config.models.completion_model.clone());
    Ok(
        PolicyPipeline::new(Arc::new(catalog), Arc::new(reranker), Arc::new(model))
            .with_config(pipeline_config),
    )
}

async fn run_generate(args: GenerateArgs, config: FinderConfig) -> Result<()> {
    let pipeline_config = resolve_pipeline_config(&config, args.top_n, args.threshold, args.concurrency)?;
    let endpoints = Endpoints::from_env();
    let github = GithubClient::new(require_secret(GITHUB_TOKEN_ENV)?)?.with_api_url(&endpoints.github);

    let catalog = load_catalog(&config, args.catalog.as_deref()).await?;
    let pipeline = build_pipeline(&config, &endpoints, catalog, pipeline_config)?;

    let outcome = pipeline
        .run_for_repository(&github, &args.repository, &args.branch, &config.paths)
        .await
        .with_context(|| {
            format!(
                "Failed to generate policy for {}@{}",
                args.repository, args.branch
            )
        })?;

    let policy = outcome.to_pretty_json()?;
    if let Some(path) = &args.out {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, format!("{policy}\n"))
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    if args.report {
        eprintln!("{}", serde_json::to_string_pretty(&outcome.report)?);
    }
    println!("{policy}");
    Ok(())
}

async fn run_catalog(args: CatalogArgs, config: FinderConfig) -> Result<()> {
    let catalog = load_catalog(&config, args.catalog.as_deref()).await?;

    match (args.service.as_deref(), args.action.as_deref()) {
        (Some(service), Some(action)) => {
            if !is_valid_action(&catalog, service, action) {
                anyhow::bail!("{service}:{action} is not in the action catalog");
            }
            println!("{service}:{action} is valid");
        }
        (Some(service), None) => {
            let actions = catalog
                .actions(service)
                .with_context(|| format!("Unknown service: {service}"))?;
            for action in actions {
                println!("{service}:{action}");
            }
        }
        _ => {
            for service in catalog.service_names() {
                println!("{service}");
            }
        }
    }
    Ok(())
}

async fn serve_http(args: ServeArgs, config: FinderConfig) -> Result<()> {
    let secret = server_security::WebhookSecret::parse(secret_from_env(WEBHOOK_SECRET_ENV).as_deref())?;
    let bind = args.bind.unwrap_or_else(|| config.server.bind.clone());
    let addrs = server_security::resolve_guarded_bind_addrs(&bind, args.public, secret.as_ref()).await?;
    let addr = server_security::choose_preferred_bind_addr(&addrs)
        .with_context(|| format!("No usable bind address for {bind}"))?;
    if secret.is_none() {
        log::warn!("{WEBHOOK_SECRET_ENV} is not set; webhook signatures are not verified");
    }

    let pipeline_config = resolve_pipeline_config(&config, None, None, None)?;
    let endpoints = Endpoints::from_env();
    let app = github_app_from_env()?;
    let github = match (secret_from_env(GITHUB_TOKEN_ENV), &app) {
        (_, Some(app)) => {
            log::info!("Using GitHub App installation tokens client_id={}", app.client_id());
            GithubClient::unauthenticated()?
        }
        (Some(token), None) => GithubClient::new(token)?,
        (None, None) => anyhow::bail!(
            "{GITHUB_TOKEN_ENV} or {GITHUB_APP_CLIENT_ID_ENV} with {GITHUB_APP_PRIVATE_KEY_ENV} must be set"
        ),
    }
    .with_api_url(&endpoints.github);
    let catalog = load_catalog(&config, args.catalog.as_deref()).await?;
    let pipeline = build_pipeline(&config, &endpoints, catalog, pipeline_config)?;

    let (jobs_tx, jobs_rx) = tokio::sync::mpsc::channel(webhook::JOB_QUEUE_CAPACITY);
    let runner = webhook::JobRunner {
        github,
        app,
        pipeline,
        filter: config.paths.clone(),
    };
    tokio::spawn(runner.run(jobs_rx));

    let state = Arc::new(webhook::WebhookState {
        secret,
        jobs: jobs_tx,
    });
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    log::info!("Serving webhook on http://{addr}/events");
    axum::serve(listener, webhook::router(state)).await?;
    Ok(())
}
