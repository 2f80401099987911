use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tpsbench_rs::{
    print_summary, run_benchmark, BenchmarkConfig, ModalClass, ModalModel, Url, DEFAULT_APP,
    DEFAULT_CLASS, DEFAULT_MAX_TOKENS, DEFAULT_PROMPT, DEFAULT_RUNS,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const PROMPT_PREVIEW_CHARS: usize = 60;

#[derive(Parser, Debug)]
#[command(
    name = "tpsbench",
    about = "Benchmark tokens per second of a Modal-hosted model"
)]
struct Args {
    /// Prompt to send to the model
    #[arg(short, long, default_value = DEFAULT_PROMPT)]
    prompt: String,

    /// Maximum tokens to generate
    #[arg(short, long, default_value_t = DEFAULT_MAX_TOKENS)]
    max_tokens: u32,

    /// Number of benchmark runs
    #[arg(short, long, default_value_t = DEFAULT_RUNS)]
    runs: usize,

    /// Skip the warmup run
    #[arg(long)]
    no_warmup: bool,

    /// Modal workspace that owns the app; if omitted MODAL_WORKSPACE is read
    #[arg(long)]
    workspace: Option<String>,

    /// Modal environment suffix for the web endpoint host
    #[arg(long)]
    environment: Option<String>,

    /// Modal app name
    #[arg(long, default_value = DEFAULT_APP)]
    app: String,

    /// Modal class name
    #[arg(long, default_value = DEFAULT_CLASS)]
    class: String,

    /// Full endpoint URL; skips resolving the app and class names
    #[arg(long)]
    endpoint: Option<String>,

    /// Proxy-auth token id; if omitted MODAL_TOKEN_ID is read
    #[arg(long)]
    token_id: Option<String>,

    /// Proxy-auth token secret; if omitted MODAL_TOKEN_SECRET is read
    #[arg(long)]
    token_secret: Option<String>,

    /// Request timeout in seconds (0 disables it)
    #[arg(long, default_value_t = 600)]
    request_timeout_secs: u64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let config =
        BenchmarkConfig::try_new(args.prompt, args.max_tokens, args.runs, !args.no_warmup)?;

    let mut class = ModalClass::new(args.app, args.class);
    if let Some(workspace) = args
        .workspace
        .or_else(|| std::env::var("MODAL_WORKSPACE").ok())
    {
        class = class.with_workspace(workspace);
    }
    if let Some(environment) = args.environment {
        class = class.with_environment(environment);
    }
    if let Some(endpoint) = args.endpoint {
        let url = Url::parse(&endpoint)
            .with_context(|| format!("invalid endpoint URL: {}", endpoint))?;
        class = class.with_endpoint(url);
    }

    let token_id = args
        .token_id
        .or_else(|| std::env::var("MODAL_TOKEN_ID").ok());
    let token_secret = args
        .token_secret
        .or_else(|| std::env::var("MODAL_TOKEN_SECRET").ok());

    let model = ModalModel::connect(class, Duration::from_secs(args.request_timeout_secs))
        .and_then(|model| model.with_credentials(token_id, token_secret))
        .context("modal client is not available")?;

    print_banner(&config, &model)?;

    let results = run_benchmark(&model, &config).await?;

    print_summary(&results)?;

    Ok(())
}

fn print_banner(config: &BenchmarkConfig, model: &ModalModel) -> Result<()> {
    let rule = "=".repeat(50);
    let class = model.class();
    println!("MODAL TPS BENCHMARK ({}/{})", class.app, class.class);
    println!("{}", rule);
    println!("Endpoint: {}", class.resolve()?);
    println!("Prompt: {}", config.prompt_preview(PROMPT_PREVIEW_CHARS));
    println!("Max tokens: {}", config.max_tokens);
    println!("Runs: {}", config.runs);
    println!("Warmup: {}", config.warmup);
    println!("{}", rule);
    println!();
    Ok(())
}
