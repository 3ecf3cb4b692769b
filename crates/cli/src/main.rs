mod config_commands;
mod task_commands;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    taskbridge_config::{BridgeConfig, Severity},
    tracing::{error, info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(
    name = "taskbridge",
    about = "Turn WhatsApp messages into a local task queue",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (skips discovery in ./ and ~/.config/taskbridge/).
    #[arg(long, global = true, env = "TASKBRIDGE_CONFIG")]
    config: Option<PathBuf>,
    /// Address to bind to (overrides config value).
    #[arg(long, global = true)]
    bind: Option<String>,
    /// Port to listen on (overrides config value).
    #[arg(long, global = true)]
    port: Option<u16>,
    /// Queue data directory (overrides config value).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the webhook server, processor and poller (default).
    Serve,
    /// Inspect and manage queued tasks.
    Tasks {
        #[command(subcommand)]
        action: task_commands::TaskAction,
    },
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Load config and layer the command-line overrides on top.
fn load_config(cli: &Cli) -> anyhow::Result<BridgeConfig> {
    let mut config = taskbridge_config::discover_and_load(cli.config.as_deref())?;
    if let Some(ref bind) = cli.bind {
        config.server.bind.clone_from(bind);
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(ref dir) = cli.data_dir {
        config.queue.data_dir = Some(dir.clone());
    }
    Ok(config)
}

async fn serve(config: BridgeConfig) -> anyhow::Result<()> {
    let result = taskbridge_config::validate::validate(&config);
    for d in &result.diagnostics {
        match d.severity {
            Severity::Error => error!(path = %d.path, "{}", d.message),
            Severity::Warning => warn!(path = %d.path, "{}", d.message),
            Severity::Info => info!(path = %d.path, "{}", d.message),
        }
    }
    if result.has_errors() {
        anyhow::bail!(
            "invalid configuration ({} error(s)); run `taskbridge config check` for details",
            result.count(Severity::Error)
        );
    }
    taskbridge_gateway::start_gateway(config).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "taskbridge starting");

    match cli.command {
        None | Some(Commands::Serve) => serve(load_config(&cli)?).await,
        Some(Commands::Tasks { ref action }) => {
            let config = load_config(&cli)?;
            task_commands::handle_tasks(action.clone(), &config).await
        },
        Some(Commands::Config { ref action }) => {
            config_commands::handle_config(action.clone(), cli.config.as_deref())
        },
    }
}
