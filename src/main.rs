use hybrid_gateway::cli::{Cli, Commands, ConfigAction};
use hybrid_gateway::config::Config;
use hybrid_gateway::error::{GatewayError, Result};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    hybrid_gateway::logging::init_logging();

    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Handle commands
    match cli.command {
        None => cmd_serve(cli.config, None, None).await?,
        Some(Commands::Serve { host, port }) => cmd_serve(cli.config, host, port).await?,
        Some(Commands::Config { action }) => cmd_config(cli.config, action)?,
    }

    Ok(())
}

async fn cmd_serve(config_path: Option<PathBuf>, host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut config = load_config(config_path).inspect_err(|e| {
        tracing::error!("Refusing to start: {}", e);
    })?;

    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    tracing::info!("Configuration loaded successfully");
    hybrid_gateway::http::run(config).await
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            let json = serde_json::to_string_pretty(&config).map_err(|e| GatewayError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;
            println!("{}", json);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
            println!(
                "  Candidate backends: vector={} lexical={}",
                config.backends.vector_index_url.is_some(),
                config.backends.lexical_index_url.is_some()
            );
        }
    }

    Ok(())
}

/// Explicit file, else the default file when present, else environment only
fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    if let Some(path) = config_path {
        return Config::load(&path);
    }

    match Config::default_path() {
        Ok(path) if path.exists() => Config::load(&path),
        _ => Config::from_env(),
    }
}
