use clap::{Args, Parser, Subcommand, ValueEnum};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mcp_compliance::channel::{HttpWrapper, ProcessChannel, Target};
use mcp_compliance::config::{Config, ConfigError, show_config};
use mcp_compliance::harness::Harness;
use mcp_compliance::probes::{Probe, catalogue, find};
use mcp_compliance::report::{ComplianceReport, render_json, render_text};
use mcp_compliance::{HarnessError, Result};

#[derive(Parser)]
#[command(name = "mcp-compliance")]
#[command(about = "Black-box MCP protocol compliance tester for stdio servers")]
#[command(version)]
struct Cli {
    /// Path to config.toml (defaults to ~/.mcp-compliance/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the probe catalogue against the target server
    Run {
        /// Report format written to stdout
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
        /// Run only the named probe (repeatable)
        #[arg(long = "only", value_name = "PROBE")]
        only: Vec<String>,
        #[command(flatten)]
        overrides: Overrides,
    },
    /// List the probe catalogue
    List,
    /// Inspect the configuration
    Config {
        /// Show the effective configuration
        #[arg(long)]
        show: bool,
        #[command(flatten)]
        overrides: Overrides,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

/// Command line values that take precedence over config.toml
#[derive(Args, Debug, Default)]
struct Overrides {
    /// Interpreter used to launch the target
    #[arg(long)]
    interpreter: Option<String>,
    /// Server script passed to the interpreter
    #[arg(long)]
    script: Option<PathBuf>,
    /// Per-probe timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<u64>,
    /// Server name expected in serverInfo
    #[arg(long)]
    expected_name: Option<String>,
    /// HTTP transport wrapper endpoint
    #[arg(long, value_name = "URL")]
    http_endpoint: Option<String>,
}

impl Overrides {
    fn apply(self, config: &mut Config) -> std::result::Result<(), ConfigError> {
        if let Some(interpreter) = self.interpreter {
            config.target.interpreter = interpreter;
        }
        if let Some(script) = self.script {
            config.target.script = script;
        }
        if let Some(timeout) = self.timeout {
            config.probes.set_timeout_secs(timeout)?;
        }
        if let Some(name) = self.expected_name {
            config.probes.set_expected_server_name(name)?;
        }
        if let Some(endpoint) = self.http_endpoint {
            config.http.set_endpoint(endpoint)?;
        }
        config.target.validate()
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            format,
            only,
            overrides,
        } => {
            let mut config = Config::load(cli.config.as_deref())?;
            overrides.apply(&mut config)?;
            let probes = select_probes(&only)?;
            let report = run(&config, &probes).await?;

            let rendered = match format {
                Format::Text => render_text(&report),
                Format::Json => render_json(&report)?,
            };
            println!("{}", rendered);

            let code = u8::try_from(report.exit_code()).unwrap_or(1);
            return Ok(ExitCode::from(code));
        }
        Commands::List => list_probes(),
        Commands::Config { show, overrides } => {
            let mut config = Config::load(cli.config.as_deref())?;
            overrides.apply(&mut config)?;
            let path = match cli.config {
                Some(path) => path,
                None => Config::config_file_path()?,
            };

            if show {
                show_config(&config, &config_source(&path));
            } else {
                eprintln!("Config file: {}", style(path.display()).cyan());
                eprintln!("Use --show to print the effective configuration");
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Resolve `--only` names, or the whole catalogue when none are given
fn select_probes(only: &[String]) -> Result<Vec<Probe>> {
    if only.is_empty() {
        return Ok(catalogue());
    }

    only.iter()
        .map(|name| {
            find(name).ok_or_else(|| {
                HarnessError::Probe(format!(
                    "Unknown probe '{}', run `mcp-compliance list` to see the catalogue",
                    name
                ))
            })
        })
        .collect()
}

async fn run(config: &Config, probes: &[Probe]) -> Result<ComplianceReport> {
    let channel = ProcessChannel::new(&config.target)?;
    let http = config
        .http
        .endpoint_url()?
        .map(|url| HttpWrapper::new(url, config.probes.timeout()));
    if let Some(wrapper) = &http {
        info!("Using HTTP transport wrapper at {}", wrapper.endpoint());
    }

    let mut report = ComplianceReport::new(channel.describe());
    let mut harness = Harness::new(channel, config.probes.clone()).with_http(http);

    let bar = if console::user_attended_stderr() {
        ProgressBar::new_spinner().with_style(
            ProgressStyle::with_template("{spinner} [{pos}/{len}] Probing {msg}")
                .expect("style template is valid"),
        )
    } else {
        ProgressBar::hidden()
    };
    bar.set_length(probes.len() as u64);
    bar.enable_steady_tick(Duration::from_millis(100));

    harness
        .run(probes, &mut report, |probe| {
            bar.set_message(probe.name);
            bar.inc(1);
        })
        .await;
    bar.finish_and_clear();

    Ok(report)
}

fn list_probes() {
    for probe in catalogue() {
        println!(
            "{:<22} {:<16} {}",
            style(probe.name).bold(),
            style(probe.category).cyan(),
            probe.description
        );
    }
}

fn config_source(path: &Path) -> String {
    if path.exists() {
        path.display().to_string()
    } else {
        format!("built-in defaults (no file at {})", path.display())
    }
}
