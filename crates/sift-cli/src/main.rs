use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use rustyline::{error::ReadlineError, DefaultEditor};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sift_core::{ResearchResult, Researcher, ResearcherConfig, ToolRegistry};
use sift_providers::OpenAIProvider;
use sift_tools::{create_web_tools, FetchPageConfig, WebSearchConfig};

mod config;

use config::{Config, Overrides};

const RULE: &str =
    "================================================================================";
const THIN_RULE: &str =
    "--------------------------------------------------------------------------------";

/// Log level for tracing output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// Most verbose: every request and tool result
    Trace,
    /// Verbose: model requests, tool invocations
    Debug,
    /// Standard: session start and finish, each step
    Info,
    /// Quiet: only warnings and errors
    Warn,
    /// Minimal: only errors
    Error,
}

impl LogLevel {
    fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Parser)]
#[command(name = "sift")]
#[command(author, version, about = "Sift: an autonomous web research agent", long_about = None)]
pub struct Cli {
    /// Topic to research (prompted for when omitted)
    pub topic: Vec<String>,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,

    /// Show the resolved configuration and exit
    #[arg(long)]
    pub show_config: bool,

    /// Model to use (overrides MODEL_NAME and config)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Sampling temperature
    #[arg(short, long)]
    pub temperature: Option<f32>,

    /// Maximum reasoning steps before the report is cut short
    #[arg(long)]
    pub max_steps: Option<usize>,

    /// Base URL for the OpenAI-compatible API
    #[arg(long)]
    pub base_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_enum, default_value = "warn")]
    pub log_level: LogLevel,

    /// Write logs to file (JSON-lines format)
    #[arg(long)]
    pub log_file: Option<std::path::PathBuf>,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            model_name: self.model.clone(),
            temperature: self.temperature,
            max_steps: self.max_steps,
            base_url: self.base_url.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let filter = EnvFilter::new(cli.log_level.as_filter());
    if let Some(log_path) = &cli.log_file {
        let file = std::fs::File::create(log_path)
            .with_context(|| format!("Failed to create log file: {:?}", log_path))?;
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::sync::Mutex::new(file)))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    // A missing .env file is not an error.
    let _ = dotenvy::dotenv();

    let config = Config::load(&cli.overrides())?;

    if cli.show_config {
        println!("{}", config.display());
        return Ok(ExitCode::SUCCESS);
    }

    let keys = config.api_keys()?;

    let topic = match topic_from_args(&cli.topic) {
        Some(topic) => topic,
        None => prompt_for_topic()?,
    };
    if topic.is_empty() {
        println!("No topic provided.");
        return Ok(ExitCode::SUCCESS);
    }

    let provider = OpenAIProvider::new(keys.openai)
        .with_base_url(&config.base_url)
        .with_default_model(&config.model_name);

    let tools = ToolRegistry::with_tools(create_web_tools(
        WebSearchConfig::new(keys.serper).with_endpoint(&config.search_endpoint),
        FetchPageConfig::default().with_max_chars(config.max_page_chars),
    ))?;

    let researcher = Researcher::new(
        Arc::new(provider),
        tools,
        ResearcherConfig::new()
            .with_model(&config.model_name)
            .with_temperature(config.temperature)
            .with_max_steps(config.max_steps),
    );

    let cancel = researcher.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    if !cli.json {
        eprintln!("Researching: {}", topic);
        eprintln!("This may take a few minutes...\n");
    }

    let result = researcher.research(&topic).await;
    info!(
        sources = result.sources.len(),
        error = result.error,
        incomplete = result.incomplete,
        "Research finished"
    );

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", render_report(&result));
    }

    Ok(if result.is_error() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn topic_from_args(words: &[String]) -> Option<String> {
    if words.is_empty() {
        None
    } else {
        Some(words.join(" ").trim().to_string())
    }
}

/// Ask for a topic interactively. Ctrl-C or Ctrl-D counts as no topic.
fn prompt_for_topic() -> Result<String> {
    let mut editor = DefaultEditor::new().context("Failed to initialize line editor")?;
    match editor.readline("Enter a research topic: ") {
        Ok(line) => Ok(line.trim().to_string()),
        Err(ReadlineError::Interrupted | ReadlineError::Eof) => Ok(String::new()),
        Err(e) => Err(e).context("Failed to read topic"),
    }
}

fn render_report(result: &ResearchResult) -> String {
    let mut out = vec![
        RULE.to_string(),
        "RESEARCH REPORT".to_string(),
        RULE.to_string(),
        format!("Topic: {}", result.topic),
        String::new(),
        result.report.clone(),
        String::new(),
        THIN_RULE.to_string(),
        "SOURCES".to_string(),
        THIN_RULE.to_string(),
    ];

    if result.sources.is_empty() {
        out.push("(no sources cited)".to_string());
    } else {
        out.extend(
            result
                .sources
                .iter()
                .enumerate()
                .map(|(i, url)| format!("{}. {}", i + 1, url)),
        );
    }

    out.push(String::new());
    out.push(format!("Completed at: {}", result.timestamp));
    out.join("\n")
}
