use anyhow::Result;
use clap::{Parser, Subcommand};
use forumkit::PageRequest;
use forumkit_bootstrap::{AppConfig, CliArgs};
use mimalloc::MiMalloc;

use std::path::{Path, PathBuf};

mod host;
mod registered_modules;

use host::Host;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Forum host - drives forum page requests through the module lifecycle
#[derive(Parser)]
#[command(name = "forum-host")]
#[command(about = "Forum host - drives forum page requests through the module lifecycle")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Board id override (overrides config)
    #[arg(short, long)]
    board: Option<i64>,

    /// Print effective configuration (YAML) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Render one request, e.g. `render "g=posts&t=12"`
    Render {
        /// Raw query string
        #[arg(default_value = "")]
        query: String,

        /// User-Agent header of the simulated request
        #[arg(long)]
        user_agent: Option<String>,
    },
    /// Validate configuration and module init, then exit
    Check,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let args = CliArgs {
        config: cli.config.as_ref().map(|p| p.to_string_lossy().to_string()),
        print_config: cli.print_config,
        verbose: cli.verbose,
        board: cli.board,
    };

    // 1) defaults -> 2) YAML (if provided) -> 3) env (APP__*) -> 4) CLI overrides
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    config.apply_cli_overrides(&args);
    config.validate()?;

    let base_dir = cli
        .config
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let logging_config = config.logging.clone().unwrap_or_default();
    forumkit_bootstrap::init_logging(&logging_config, &base_dir);

    tracing::info!("Forum host starting");

    if cli.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    match cli.command.unwrap_or(Commands::Render {
        query: String::new(),
        user_agent: None,
    }) {
        Commands::Render { query, user_agent } => render(&config, &query, user_agent),
        Commands::Check => check(&config),
    }
}

fn render(config: &AppConfig, query: &str, user_agent: Option<String>) -> Result<()> {
    let host = Host::build(config)?;

    let mut request = PageRequest::from_query(query);
    if let Some(agent) = user_agent {
        request = request.with_user_agent(agent);
    }
    let summary = host.render(request)?;

    println!("request   {}", summary.request_id);
    println!("page      {}", summary.page);
    println!("board     {} ({})", summary.board_id, summary.board_name);
    println!(
        "user      {} [{}]",
        summary.user.as_deref().unwrap_or("<guest>"),
        summary.roles.join(", ")
    );
    println!("url       {}", summary.page_url);
    for element in &summary.elements {
        println!("element   {} ({:?})", element.name, element.kind);
    }
    for message in &summary.load_messages {
        println!("message   {message}");
    }
    if summary.failures > 0 {
        println!("failures  {}", summary.failures);
    }
    Ok(())
}

fn check(config: &AppConfig) -> Result<()> {
    tracing::info!("Checking configuration…");
    let host = Host::build(config)?;
    println!("Configuration is valid");
    println!("modules: {}", host.module_names().join(", "));
    println!("{}", config.to_yaml()?);
    Ok(())
}
