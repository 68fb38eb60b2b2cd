use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flowhome_bridge::bridge::Bridge;
use flowhome_bridge::client::UpstreamClient;
use flowhome_bridge::config::Config;
use flowhome_bridge::endpoint::{self, discovery};
use flowhome_bridge::error::BridgeErrorTrait;
use flowhome_bridge::metrics;
use flowhome_bridge::server::BridgeServer;
use flowhome_bridge::webhooks::WebhookStore;

#[derive(Parser)]
#[command(
    name = "flowhome-bridge",
    version,
    about = "Poll-and-push bridge between a FlowHome chore service and a home automation host",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML config file; FLOWHOME_* environment variables are used when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true, default_value = "text")]
    log_format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge: poll the upstream and serve the control API
    Serve,

    /// Test the upstream connection and credentials
    Check,

    /// Show how connection input resolves to an endpoint
    Resolve {
        /// Hostname, host:port or URL
        host: String,

        /// Port used when the host carries none
        #[arg(short, long, default_value_t = endpoint::DEFAULT_PORT)]
        port: u16,

        /// Force TLS on or off
        #[arg(long)]
        ssl: Option<bool>,

        /// Treat the input as a zeroconf record with this service name
        #[arg(long)]
        service_name: Option<String>,
    },

    /// Inspect persisted webhook registrations
    Webhooks {
        #[command(subcommand)]
        command: WebhookCommands,
    },
}

#[derive(Subcommand)]
enum WebhookCommands {
    /// List the registrations stored for the configured entry
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_tracing(&cli.log_format, cli.verbose)?;

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve => serve(config).await?,
        Commands::Check => check(config).await?,
        Commands::Resolve {
            host,
            port,
            ssl,
            service_name,
        } => resolve(&host, Some(port), ssl, service_name.as_deref())?,
        Commands::Webhooks {
            command: WebhookCommands::List,
        } => list_webhooks(config).await?,
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("flowhome_bridge=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("flowhome_bridge=info,warn"))
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    Ok(())
}

async fn serve(config: Config) -> Result<()> {
    if let Err(e) = metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics initialization failed, continuing without metrics");
    }

    let bridge = match Bridge::setup(&config).await {
        Ok(bridge) => bridge,
        Err(e) => {
            tracing::error!(category = %e.category(), error = %e, "Bridge setup failed");
            return Err(e.into());
        }
    };

    let server = BridgeServer::new(bridge.clone(), &config.server)?;
    println!("{}", server.info().display());

    let result = server
        .start_with_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
        })
        .await;

    bridge.unload().await;
    result?;
    Ok(())
}

async fn check(config: Config) -> Result<()> {
    let client = UpstreamClient::new(config.client_config()?)?;

    match client.validate().await {
        Ok(info) => {
            println!("Connected to {}", client.endpoint());
            println!("  Title: {}", info.title);
            println!("  Version: {}", info.version.as_deref().unwrap_or("unknown"));
            println!(
                "  Authenticated: {}",
                if client.has_api_key() { "yes" } else { "no key configured" }
            );
            Ok(())
        }
        Err(e) => {
            println!("Connection to {} failed ({}): {e}", client.endpoint(), e.category());
            Err(e.into())
        }
    }
}

fn resolve(host: &str, port: Option<u16>, ssl: Option<bool>, service_name: Option<&str>) -> Result<()> {
    let (resolved, name) = match service_name {
        Some(service_name) => {
            let service = discovery::from_discovery(host, port, service_name)?;
            (service.endpoint, Some(service.name))
        }
        None => (endpoint::resolve(host, port, ssl)?, None),
    };

    if let Some(name) = name {
        println!("Name:      {name}");
    }
    println!("URL:       {}", resolved.canonical_url());
    println!("API base:  {}", resolved.api_base_url());
    println!("Host:      {}", resolved.host);
    println!("Port:      {}", resolved.port());
    println!("TLS:       {}", if resolved.use_ssl { "yes" } else { "no" });
    println!("Unique ID: {}", resolved.unique_id());
    Ok(())
}

async fn list_webhooks(config: Config) -> Result<()> {
    let entry_id = config.entry_id()?;
    let external_url = config.external_url()?;
    let store = WebhookStore::new(&config.webhooks.storage_dir, &entry_id);
    let table = store.load().await?;

    println!("Webhooks for {entry_id} ({})", store.path().display());
    if table.is_empty() {
        println!("  (none)");
    }
    for (webhook_id, info) in &table {
        println!(
            "  {webhook_id}  {}  local_only={}  {external_url}{}/{webhook_id}",
            info.name,
            info.local_only,
            flowhome_bridge::webhooks::dispatcher::WEBHOOK_PATH_PREFIX,
        );
    }
    Ok(())
}
