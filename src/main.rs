//! IndexTTS API CLI
//!
//! Runs the HTTP service, probes the fused activation kernel, or prints the
//! default server configuration.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use indextts_api::models::vocoder::{
    kernel_search_paths, probe_kernel, FusedKernel, KERNEL_ENV_VAR,
};
use indextts_api::{ServerConfig, TtsServer, VERSION};

/// IndexTTS API - HTTP service for zero-shot text-to-speech
#[derive(Parser, Debug)]
#[command(name = "indextts-api")]
#[command(author, version, about, long_about = None)]
#[command(long_about = "
HTTP service for the IndexTTS zero-shot TTS model.

Examples:
  # Serve on 0.0.0.0:7860 with checkpoints/ as the model directory
  indextts-api serve

  # Serve with a config file, overriding the port
  indextts-api serve --config server.yaml --port 8000

  # Check whether the fused activation kernel loads
  indextts-api kernel --path build/anti_alias_activation_cuda.so
")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Server config file (YAML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Host to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Checkpoint directory
        #[arg(long)]
        model_dir: Option<PathBuf>,

        /// Checkpoint config.yaml
        #[arg(long)]
        cfg_path: Option<PathBuf>,

        /// Output directory for synthesized audio
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Report whether the fused activation kernel can be loaded
    Kernel {
        /// Kernel library to load instead of searching
        #[arg(long)]
        path: Option<PathBuf>,

        /// Directory to search before the defaults
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Print the default server configuration as YAML
    Config,
}

fn setup_logging(verbose: bool, level: &str) -> Result<()> {
    let default_level = if verbose { "debug" } else { level };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .context("Invalid log level")?;

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

fn load_server_config(
    config: Option<&PathBuf>,
    host: Option<String>,
    port: Option<u16>,
    model_dir: Option<PathBuf>,
    cfg_path: Option<PathBuf>,
    output_dir: Option<PathBuf>,
) -> Result<ServerConfig> {
    let mut server_config = match config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };

    if let Some(host) = host {
        server_config.host = host;
    }
    if let Some(port) = port {
        server_config.port = port;
    }
    if let Some(model_dir) = model_dir {
        // cfg_path follows model_dir unless given explicitly
        server_config.model.cfg_path = model_dir.join("config.yaml");
        server_config.model.model_dir = model_dir;
    }
    if let Some(cfg_path) = cfg_path {
        server_config.model.cfg_path = cfg_path;
    }
    if let Some(output_dir) = output_dir {
        server_config.output_dir = output_dir;
    }
    Ok(server_config)
}

fn run_kernel_probe(path: Option<PathBuf>, dir: Option<PathBuf>) -> Result<()> {
    let kernel = match path {
        Some(path) => Some(
            FusedKernel::load(&path)
                .with_context(|| format!("Failed to load kernel {}", path.display()))?,
        ),
        None => {
            let candidates = kernel_search_paths(dir.as_deref());
            println!("Search order (override with ${}):", KERNEL_ENV_VAR);
            for candidate in &candidates {
                println!("  {}", candidate.display());
            }
            probe_kernel(&candidates)
        }
    };

    match kernel {
        Some(kernel) => println!("Fused activation kernel: {}", kernel.path().display()),
        None => println!("Fused activation kernel: not available (unfused fallback in use)"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            host,
            port,
            model_dir,
            cfg_path,
            output_dir,
        } => {
            let server_config =
                load_server_config(config.as_ref(), host, port, model_dir, cfg_path, output_dir)?;
            setup_logging(cli.verbose, &server_config.logging.level)?;

            info!("IndexTTS API v{}", VERSION);
            TtsServer::new(server_config).run().await
        }

        Commands::Kernel { path, dir } => {
            setup_logging(cli.verbose, "warn")?;
            run_kernel_probe(path, dir)
        }

        Commands::Config => {
            let yaml = serde_yaml::to_string(&ServerConfig::default())?;
            print!("{}", yaml);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_serve() {
        let cli = Cli::try_parse_from(["indextts-api", "serve", "--port", "9000"]).unwrap();
        match cli.command {
            Commands::Serve { port, host, .. } => {
                assert_eq!(port, Some(9000));
                assert!(host.is_none());
            }
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn test_overrides() {
        let config = load_server_config(
            None,
            Some("127.0.0.1".into()),
            Some(8000),
            Some(PathBuf::from("/ckpt")),
            None,
            None,
        )
        .unwrap();
        assert_eq!(config.bind_addr(), "127.0.0.1:8000");
        assert_eq!(config.model.model_dir, PathBuf::from("/ckpt"));
        assert_eq!(config.model.cfg_path, PathBuf::from("/ckpt/config.yaml"));

        let config = load_server_config(
            None,
            None,
            None,
            Some(PathBuf::from("/ckpt")),
            Some(PathBuf::from("/etc/indextts.yaml")),
            None,
        )
        .unwrap();
        assert_eq!(config.model.cfg_path, PathBuf::from("/etc/indextts.yaml"));
        assert_eq!(config.port, 7860);
    }
}
