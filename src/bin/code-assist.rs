//! CLI binary for code-assist-backend.
//!
//! A thin shim over the library crate that maps CLI flags to `AssistConfig`
//! and either serves the HTTP API or runs one operation and prints JSON.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::{Args, Parser, Subcommand};
use code_assist::api::{serve, ApiLimits};
use code_assist::{
    AssistConfig, CodeAssistant, DegradeReason, ExtractRequest, GenerateRequest, InvocationObserver,
    ProblemInfo, StageError,
};
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Serve the API on 0.0.0.0:3000
  code-assist serve

  # Serve on another port with faster retries
  code-assist --max-retries 3 --initial-backoff-ms 500 serve --port 8080

  # Extract the problem from a screenshot
  code-assist extract screenshot.png --language rust

  # Generate a solution from text or from a file
  code-assist generate "Return the indices of two numbers that add up to target"
  code-assist generate @problem.txt --language go

ENVIRONMENT VARIABLES:
  MISTRAL_API_KEY             Mistral API key (OCR, and the default chat provider)
  CODE_ASSIST_HOST            Bind address for `serve`
  CODE_ASSIST_PORT            Port for `serve`
  CODE_ASSIST_MAX_RETRIES     Attempt ceiling per request
  CODE_ASSIST_VISION_MODEL    Vision chat model
  CODE_ASSIST_GENERATION_MODEL  Generation chat model
  RUST_LOG                    Overrides -v / -q log filtering

RETRY POLICY:
  Rate limits and network errors restart the whole pipeline after a backoff
  that doubles each time (2s, 4s, 8s, ... by default). When attempts run out
  the response quotes whatever partial text was obtained instead of failing.
"#;

/// Screenshot-to-solution backend with resilient AI provider calls.
#[derive(Parser, Debug)]
#[command(
    name = "code-assist",
    version,
    about = "Screenshot-to-solution backend with resilient AI provider calls",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Server options used when no subcommand is given.
    #[command(flatten)]
    serve: ServeArgs,

    #[command(flatten)]
    settings: Settings,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "CODE_ASSIST_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "CODE_ASSIST_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API (default).
    Serve(ServeArgs),

    /// Extract the problem statement from a screenshot and print it as JSON.
    Extract {
        /// Path to a PNG/JPEG/WebP/GIF screenshot.
        image: PathBuf,

        /// Solution language to report (default: --default-language).
        #[arg(short, long)]
        language: Option<String>,
    },

    /// Generate a solution and print it as JSON.
    Generate {
        /// Problem text, or `@path` to read it from a file.
        problem: String,

        /// Solution language (default: --default-language).
        #[arg(short, long)]
        language: Option<String>,
    },
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to bind.
    #[arg(long, env = "CODE_ASSIST_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on.
    #[arg(short, long, env = "CODE_ASSIST_PORT", default_value_t = 3000)]
    port: u16,

    /// Maximum request body size in MB.
    #[arg(long, env = "CODE_ASSIST_MAX_BODY_MB", default_value_t = 20)]
    max_body_mb: usize,
}

#[derive(Args, Debug)]
struct Settings {
    /// Attempt ceiling shared by every stage of a request.
    #[arg(long, global = true, env = "CODE_ASSIST_MAX_RETRIES", default_value_t = 5)]
    max_retries: u32,

    /// First backoff delay in milliseconds (doubles after each retry).
    #[arg(long, global = true, env = "CODE_ASSIST_INITIAL_BACKOFF_MS", default_value_t = 2000)]
    initial_backoff_ms: u64,

    /// Per-call timeout in seconds.
    #[arg(long, global = true, env = "CODE_ASSIST_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Language used when a request does not name one.
    #[arg(long, global = true, env = "CODE_ASSIST_DEFAULT_LANGUAGE", default_value = "python")]
    default_language: String,

    /// Mistral API key (falls back to MISTRAL_API_KEY).
    #[arg(long, global = true, env = "MISTRAL_API_KEY", hide_env_values = true)]
    mistral_api_key: Option<String>,

    /// Mistral API base URL.
    #[arg(long, global = true, env = "MISTRAL_BASE_URL")]
    mistral_base_url: Option<String>,

    /// Mistral OCR model.
    #[arg(long, global = true, env = "CODE_ASSIST_OCR_MODEL")]
    ocr_model: Option<String>,

    /// Provider for the vision stage (mistral, openai, anthropic, gemini, ...).
    #[arg(long, global = true, env = "CODE_ASSIST_VISION_PROVIDER")]
    vision_provider: Option<String>,

    /// Model for the vision stage.
    #[arg(long, global = true, env = "CODE_ASSIST_VISION_MODEL")]
    vision_model: Option<String>,

    /// Provider for the generation stage.
    #[arg(long, global = true, env = "CODE_ASSIST_GENERATION_PROVIDER")]
    generation_provider: Option<String>,

    /// Model for the generation stage.
    #[arg(long, global = true, env = "CODE_ASSIST_GENERATION_MODEL")]
    generation_model: Option<String>,

    /// Sampling temperature for both chat stages.
    #[arg(long, global = true, env = "CODE_ASSIST_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Max output tokens per chat call.
    #[arg(long, global = true, env = "CODE_ASSIST_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,
}

/// Logs retries at a level the operator sees without `-v`.
struct LoggingObserver;

impl InvocationObserver for LoggingObserver {
    fn on_backoff(&self, label: &str, error: &StageError, delay: Duration) {
        tracing::info!("{}: {} (retrying in {:?})", label, error, delay);
    }

    fn on_degraded(&self, label: &str, reason: DegradeReason, attempts: u32) {
        tracing::warn!("{}: degraded ({}) after {} attempt(s)", label, reason.as_str(), attempts);
    }
}

#[derive(Serialize)]
struct CliReport<T: Serialize> {
    #[serde(flatten)]
    value: T,
    attempts: u32,
    degraded: bool,
    duration_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli.settings)?;
    tracing::debug!("{:?}", config);

    let assistant = CodeAssistant::from_config(config)
        .context("Failed to initialise AI providers")?
        .with_observer(Arc::new(LoggingObserver));

    match cli.command.unwrap_or(Command::Serve(cli.serve)) {
        Command::Serve(args) => {
            serve(
                &args.host,
                args.port,
                Arc::new(assistant),
                ApiLimits::from_mb(args.max_body_mb),
            )
            .await
            .context("Server failed")?;
        }
        Command::Extract { image, language } => {
            let bytes = tokio::fs::read(&image)
                .await
                .with_context(|| format!("Failed to read image {:?}", image))?;
            let request = ExtractRequest {
                image_data_list: vec![STANDARD.encode(bytes)],
                language,
            };
            let invocation = assistant
                .extract(&request)
                .await
                .context("Extraction failed")?;
            print_json(&CliReport {
                degraded: invocation.is_degraded(),
                attempts: invocation.attempts,
                duration_ms: invocation.duration_ms,
                value: invocation.value,
            })?;
        }
        Command::Generate { problem, language } => {
            let problem = read_problem(&problem).await?;
            let request = GenerateRequest {
                problem_info: Some(ProblemInfo::Text(problem)),
                language,
            };
            let invocation = assistant
                .generate(&request)
                .await
                .context("Generation failed")?;
            print_json(&CliReport {
                degraded: invocation.is_degraded(),
                attempts: invocation.attempts,
                duration_ms: invocation.duration_ms,
                value: invocation.value,
            })?;
        }
    }

    Ok(())
}

/// Map CLI args to `AssistConfig`.
fn build_config(s: &Settings) -> Result<AssistConfig> {
    let mut builder = AssistConfig::builder()
        .max_retries(s.max_retries)
        .initial_backoff_ms(s.initial_backoff_ms)
        .api_timeout_secs(s.api_timeout)
        .default_language(s.default_language.clone())
        .temperature(s.temperature)
        .max_tokens(s.max_tokens);

    if let Some(ref key) = s.mistral_api_key {
        builder = builder.mistral_api_key(key.clone());
    }
    if let Some(ref url) = s.mistral_base_url {
        builder = builder.mistral_base_url(url.clone());
    }
    if let Some(ref model) = s.ocr_model {
        builder = builder.ocr_model(model.clone());
    }
    if let Some(ref name) = s.vision_provider {
        builder = builder.vision_provider(name.clone());
    }
    if let Some(ref model) = s.vision_model {
        builder = builder.vision_model(model.clone());
    }
    if let Some(ref name) = s.generation_provider {
        builder = builder.generation_provider(name.clone());
    }
    if let Some(ref model) = s.generation_model {
        builder = builder.generation_model(model.clone());
    }

    builder.build().context("Invalid configuration")
}

/// `@path` reads the problem from a file; anything else is the problem itself.
async fn read_problem(arg: &str) -> Result<String> {
    match arg.strip_prefix('@') {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read problem from {:?}", path)),
        None => Ok(arg.to_string()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialise output")?;
    println!("{json}");
    Ok(())
}
