use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use research_agent::chat::ChatProxy;
use research_agent::config::{default_config_path, write_default_config, Settings};
use research_agent::log_store::LogStore;
use research_agent::models::{SearchDownloadRequest, DEFAULT_MAX_ARTICLES};
use research_agent::pipeline::AcquisitionPipeline;
use research_agent::server::{self, AppState};
use research_agent::storage::{store_from_settings, BlobStore, LocalBlobStore};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Research Agent - find open-access articles, store their PDFs, proxy chat completions
#[derive(Parser, Debug)]
#[command(name = "research-agent")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Find open-access research articles, store their PDFs and proxy chat completions", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (can be used multiple times for more verbosity: -v, -vv)
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Show all environment variables
    #[arg(long, global = true)]
    env: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP service (default)
    Serve {
        /// Address to bind, overrides the config
        #[arg(long)]
        host: Option<String>,

        /// Port to bind, overrides the config
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Run the acquisition pipeline once and print the articles as JSON
    #[command(alias = "a")]
    Acquire {
        /// Search query string
        query: String,

        /// Number of metadata records to request
        #[arg(long, short, default_value_t = DEFAULT_MAX_ARTICLES)]
        max_articles: usize,

        /// Write PDFs to this directory instead of the configured store
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Send one system and one user message to the chat model
    Chat {
        /// System message
        #[arg(long, short)]
        system: String,

        /// User message
        user: String,
    },

    /// Write a default settings file
    InitConfig {
        /// Destination, defaults to the user config directory
        path: Option<PathBuf>,
    },
}

/// Print all available environment variables
fn print_env_vars() {
    println!("Research Agent - Environment Variables");
    println!();
    println!("Bibliographic indexes:");
    println!("  EMAIL                            Contact email sent to CrossRef and Unpaywall (required)");
    println!("  CROSSREF_BASE_URL                CrossRef works endpoint (default: https://api.crossref.org/works)");
    println!("  UNPAYWALL_BASE_URL               Unpaywall endpoint (default: https://api.unpaywall.org/v2)");
    println!();
    println!("Storage:");
    println!("  AZURE_STORAGE_CONNECTION_STRING  Azure storage connection string (selects Azure storage)");
    println!("  STORAGE_ACCOUNT_NAME             Account name, if the connection string lacks one");
    println!("  STORAGE_CONTAINER_NAME           Blob container for PDFs (required with Azure)");
    println!("  JOURNAL_ARTICLE_DIRECTORY        Local directory for PDFs when Azure is not configured");
    println!();
    println!("Chat:");
    println!("  AZURE_OPENAI_ENDPOINT            Azure OpenAI resource endpoint (required)");
    println!("  AZURE_OPENAI_API_KEY             Azure OpenAI API key (required)");
    println!("  AZURE_OPENAI_VERSION             Azure OpenAI API version (required)");
    println!();
    println!("Warning and error log store (serve only):");
    println!("  MONGODB_CONNECTION_STRING        MongoDB URI, enables the log store");
    println!("  MONGODB_DB_NAME                  Database (default: ml-research-agent)");
    println!("  MONGODB_LOG_COLLECTION           Collection (default: error-collection)");
    println!();
    println!("Any setting:");
    println!("  RESEARCH_AGENT__<SECTION>__<KEY> e.g. RESEARCH_AGENT__SERVER__PORT=9000");
    println!();
    println!("Other Settings:");
    println!("  RUST_LOG                         Rust logging level (e.g., debug, info, warn, error)");
    println!();
    println!("Variables are also read from a .env file in the working directory.");
    std::process::exit(0);
}

/// Filter directive from the command line flags, falling back to the config
fn log_directive(cli: &Cli, settings: &Settings) -> String {
    let level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => {
                if let Some(level) = &settings.logging.level {
                    return level.clone();
                }
                "info"
            }
            1 => "debug",
            _ => "trace",
        }
    };
    format!("research_agent={},tower_http={}", level, level)
}

fn init_logging(cli: &Cli, settings: &Settings, log_store: Option<&LogStore>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_directive(cli, settings)));
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(log_store.map(LogStore::layer));

    if cli.log_json || settings.logging.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Show environment variables and exit if requested
    if cli.env {
        print_env_vars();
    }

    let settings = Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;

    // only the long-running service keeps a log store
    let log_store = match cli.command {
        None | Some(Commands::Serve { .. }) => LogStore::from_settings(&settings)
            .context("Invalid log store configuration")?
            .map(Arc::new),
        _ => None,
    };
    init_logging(&cli, &settings, log_store.as_deref());

    match cli.command {
        None => serve(settings, None, None, log_store).await,
        Some(Commands::Serve { ref host, port }) => {
            serve(settings, host.clone(), port, log_store).await
        }
        Some(Commands::Acquire {
            ref query,
            max_articles,
            ref output,
        }) => acquire(&settings, query, max_articles, output.clone()).await,
        Some(Commands::Chat {
            ref system,
            ref user,
        }) => {
            let proxy = ChatProxy::from_settings(&settings)?;
            let reply = proxy.chat(system, user).await?;
            println!("{}", reply);
            Ok(())
        }
        Some(Commands::InitConfig { ref path }) => {
            let path = match path.clone().or_else(default_config_path) {
                Some(path) => path,
                None => anyhow::bail!("Could not determine a config directory; pass a path"),
            };
            write_default_config(&path)?;
            if !cli.quiet {
                println!("Wrote default configuration to {}", path.display());
            }
            Ok(())
        }
    }
}

async fn serve(
    settings: Settings,
    host: Option<String>,
    port: Option<u16>,
    log_store: Option<Arc<LogStore>>,
) -> Result<()> {
    let mut state = AppState::from_settings(&settings).context("Invalid configuration")?;
    if let Some(log_store) = log_store {
        state = state.with_log_store(log_store);
    }

    let host = host.unwrap_or_else(|| settings.server.host.clone());
    let port = port.unwrap_or(settings.server.port);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", host, port))?;

    tracing::info!("Starting Research Agent v{}", research_agent::VERSION);
    server::serve(state, addr).await?;
    Ok(())
}

async fn acquire(
    settings: &Settings,
    query: &str,
    max_articles: usize,
    output: Option<PathBuf>,
) -> Result<()> {
    SearchDownloadRequest::new(query)
        .max_articles(max_articles)
        .validate()
        .map_err(anyhow::Error::msg)?;

    let store: Arc<dyn BlobStore> = match output {
        Some(dir) => Arc::new(LocalBlobStore::new(dir)),
        None => {
            settings.validate_acquisition()?;
            store_from_settings(settings)?
        }
    };
    store.startup().await?;

    let pipeline = AcquisitionPipeline::from_settings(settings, Arc::clone(&store))?;
    let result = pipeline.run(query, max_articles).await;
    store.shutdown().await?;

    let articles = result?;
    println!("{}", serde_json::to_string_pretty(&articles)?);
    Ok(())
}
