mod logging;
mod report;
mod server;

use std::{
    io::{stdout, IsTerminal},
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    process::ExitCode,
    sync::Arc,
};

use anyhow::{Context, Result};
use check_core::probe::{smoke_check, Prober};
use check_core::retry::generate_with_retry;
use clap::{Parser, Subcommand};
use crossterm::style::Stylize;
use providers::openai::{OpenAiClient, OpenAiConfig};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::report::ProbeReport;
use crate::server::AppState;

#[derive(Parser, Debug)]
#[command(author, version, about = "Check which OpenAI models an API key can use", long_about = None)]
struct Args {
    /// Config file (defaults to <config dir>/keycheck/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Write logs to a daily rolling file in this directory instead of stderr
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Probe every model in the catalog and print a report
    Probe {
        #[arg(long)]
        prompt: Option<String>,
        /// Print the same JSON body as the HTTP route
        #[arg(long)]
        json: bool,
    },
    /// Serve the probe over HTTP
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: IpAddr,
        #[arg(long, default_value_t = 3000)]
        port: u16,
    },
    /// One completion against gpt-4o to confirm connectivity
    Ping,
    /// One-shot completion, retried on rate limiting
    Generate {
        prompt: String,
        #[arg(long)]
        model: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let default_level = match args.command {
        Some(Command::Serve { .. }) => "info",
        _ => "warn",
    };
    let _guard = match logging::init(args.log_dir.as_deref(), default_level) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red(), e);
            return ExitCode::FAILURE;
        }
    };
    if !stdout().is_terminal() {
        crossterm::style::force_color_output(false);
    }
    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let cfg = OpenAiConfig::from_env_and_file(args.config.as_deref()).context("load config")?;
    match args.command.unwrap_or(Command::Probe {
        prompt: None,
        json: false,
    }) {
        Command::Probe { prompt, json } => probe(cfg, prompt, json).await,
        Command::Serve { host, port } => serve(cfg, SocketAddr::new(host, port)).await,
        Command::Ping => ping(cfg).await,
        Command::Generate { prompt, model } => generate(cfg, &prompt, model).await,
    }
}

/// Client for commands that cannot run without a key; prints the fixed
/// message and yields `None` when it is missing.
fn client_or_report(cfg: &OpenAiConfig) -> Result<Option<OpenAiClient>> {
    if cfg.api_key.is_none() {
        println!(
            "{}",
            "Error: OPENAI_API_KEY environment variable is not set".red()
        );
        return Ok(None);
    }
    Ok(Some(OpenAiClient::new(cfg.clone())?))
}

async fn probe(cfg: OpenAiConfig, prompt: Option<String>, json: bool) -> Result<ExitCode> {
    let Some(client) = client_or_report(&cfg)? else {
        return Ok(ExitCode::FAILURE);
    };
    let settings = &cfg.probe;
    let prompt = settings.prompt_or_default(prompt.as_deref());
    let prober = Prober::from_settings(&client, settings);

    if json {
        let results = prober.probe_all(prompt, &settings.models).await;
        println!("{}", serde_json::to_string_pretty(&ProbeReport::new(results))?);
        return Ok(ExitCode::SUCCESS);
    }

    report::print_header(&cfg.masked_api_key().unwrap_or_default());
    let results = prober
        .probe_all_with(prompt, &settings.models, &mut report::TerminalProgress)
        .await;
    report::print_summary(&ProbeReport::new(results));
    Ok(ExitCode::SUCCESS)
}

async fn serve(cfg: OpenAiConfig, addr: SocketAddr) -> Result<ExitCode> {
    let client = match cfg.api_key {
        Some(_) => Some(OpenAiClient::new(cfg.clone())?),
        None => {
            warn!(target: "keycheck", "OPENAI_API_KEY not set; probe routes will return errors");
            None
        }
    };
    let state = Arc::new(AppState {
        client,
        probe: cfg.probe.clone(),
    });
    let app = server::router(state, cfg.request_budget);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {}", addr))?;
    info!(target: "keycheck", "listening on {}", addr);
    info!(target: "keycheck", "catalog: {}", cfg.probe.models.join(", "));
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!(target: "keycheck", "shutting down");
        })
        .await
        .context("serve")?;
    Ok(ExitCode::SUCCESS)
}

async fn ping(cfg: OpenAiConfig) -> Result<ExitCode> {
    let Some(client) = client_or_report(&cfg)? else {
        return Ok(ExitCode::FAILURE);
    };
    match smoke_check(&client).await {
        Ok(res) => {
            println!("{} {}", "✓".green(), res.text.trim());
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            let status = e
                .status()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            println!("{} {} (status: {})", "✗ OpenAI API test failed:".red(), e, status);
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn generate(cfg: OpenAiConfig, prompt: &str, model: Option<String>) -> Result<ExitCode> {
    let Some(client) = client_or_report(&cfg)? else {
        return Ok(ExitCode::FAILURE);
    };
    let model = model.unwrap_or_else(|| cfg.model.clone());
    let res = generate_with_retry(&client, &model, prompt, &cfg.retry)
        .await
        .with_context(|| format!("generate with {}", model))?;
    info!(
        target: "keycheck",
        "generate model={} finish={:?} prompt_tokens={:?} completion_tokens={:?}",
        model, res.finish_reason, res.prompt_tokens, res.completion_tokens
    );
    println!("{}", res.text);
    Ok(ExitCode::SUCCESS)
}
