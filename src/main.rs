//! axcess - Policy-driven LLM request routing with sequential fallback
//!
//! Routes each text-generation request to a model chosen by policy and
//! executes it against the configured providers, falling back in order.

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use axcess::config::{Config, KeySource};
use axcess::router::{RouteMetadata, RouteRequest, Router};

#[derive(Parser)]
#[command(name = "axcess")]
#[command(about = "Policy-driven LLM request routing with sequential fallback")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Path to configuration file
        #[arg(short, long, default_value = "axcess.toml")]
        config: String,

        /// Override listen address
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Validate configuration file
    Check {
        /// Path to configuration file
        #[arg(short, long, default_value = "axcess.toml")]
        config: String,
    },

    /// Show aliases and the models catalog
    Models {
        /// Path to configuration file
        #[arg(short, long, default_value = "axcess.toml")]
        config: String,
    },

    /// Print the routing decision for a prompt without calling any provider
    Route {
        /// Path to configuration file
        #[arg(short, long, default_value = "axcess.toml")]
        config: String,

        /// Prompt to route
        #[arg(short, long)]
        prompt: String,

        /// Alias or model key to force
        #[arg(long)]
        force_model: Option<String>,

        /// Caller tier used to pick the output cap
        #[arg(long)]
        tier: Option<String>,

        /// Request domain used to pick the temperature (e.g. code, creative)
        #[arg(long)]
        domain: Option<String>,

        /// Declared prompt language (skips detection)
        #[arg(long)]
        language: Option<String>,

        /// Explicit temperature
        #[arg(long)]
        temperature: Option<f64>,

        /// Requested output token cap
        #[arg(long)]
        max_output_tokens: Option<u32>,
    },
}

/// Install the subscriber. RUST_LOG wins over the configured level.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("axcess={level},tower_http={level}")));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Load the config, start logging at its level and report key sources.
fn load_config(path: &str) -> anyhow::Result<Config> {
    let (config, key_sources) = Config::from_file_with_env(path)?;
    init_tracing(&config.logging.level);
    tracing::info!(config = %path, "Loaded configuration");

    for (provider, source) in &key_sources {
        match source {
            KeySource::None => {
                tracing::warn!(provider = %provider, "No API key found; calls to this provider will fail")
            }
            _ => tracing::info!(provider = %provider, source = %source, "API key resolved"),
        }
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, listen } => {
            let mut config = load_config(&config)?;

            if let Some(addr) = listen {
                tracing::info!(listen = %addr, "Override listen address");
                config.server.listen = addr;
            }

            axcess::api::run_server(config).await
        }

        Commands::Check { config: path } => {
            let config = load_config(&path)?;
            println!(
                "Configuration OK: {} providers, {} models, {} aliases",
                config.providers.len(),
                config.catalog.models.len(),
                config.catalog.aliases.len()
            );
            println!(
                "Default alias: {}",
                config.policies.routing.default_alias
            );
            Ok(())
        }

        Commands::Models { config: path } => {
            let config = load_config(&path)?;

            println!("Aliases:");
            for (alias, target) in &config.catalog.aliases {
                println!("  {:<16} -> {}", alias, target);
            }

            println!("Models:");
            for (key, spec) in &config.catalog.models {
                println!(
                    "  {}: provider={} model={} max_output={} cap={}{} price in/out={}/{} {}",
                    key,
                    spec.provider,
                    spec.model,
                    spec.max_output_tokens,
                    spec.cap.default,
                    spec.cap
                        .hard
                        .map(|hard| format!(" (hard {})", hard))
                        .unwrap_or_default(),
                    spec.pricing.input,
                    spec.pricing.output,
                    spec.pricing.currency()
                );
            }
            Ok(())
        }

        Commands::Route {
            config: path,
            prompt,
            force_model,
            tier,
            domain,
            language,
            temperature,
            max_output_tokens,
        } => {
            let config = load_config(&path)?;
            let router = Router::from_config(&config);

            let mut request = RouteRequest::new(prompt).with_metadata(RouteMetadata {
                language,
                tier,
                domain,
                temperature,
            });
            if let Some(target) = force_model {
                request = request.with_force_model(target);
            }
            if let Some(max) = max_output_tokens {
                request = request.with_max_output_tokens(max);
            }

            let result = router.decide(&request)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
    }
}
