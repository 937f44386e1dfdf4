//! berthd: the berth daemon.
//!
//! Single binary that assembles the control plane:
//! - State store (redb)
//! - Cluster and staging substrates
//! - Application lifecycle orchestrator
//! - REST API
//!
//! # Usage
//!
//! ```text
//! berthd standalone --config /etc/berth/berth.toml --port 8443
//! berthd check-config /etc/berth/berth.toml
//! ```

mod standalone;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use berth_core::BerthConfig;
use berth_core::config::parse_duration;

#[derive(Parser)]
#[command(name = "berthd", about = "berth application platform daemon")]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control plane in a single process.
    Standalone {
        /// Path to berth.toml. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port to listen on (overrides `server.port`).
        #[arg(long)]
        port: Option<u16>,

        /// Data directory for persistent state (overrides `server.data_dir`).
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Readiness wait, e.g. "5m" (overrides `deploy.timeout`).
        #[arg(long)]
        deploy_timeout: Option<String>,
    },

    /// Parse a config file and print the effective configuration.
    CheckConfig {
        file: PathBuf,
    },
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,berthd=debug,berth=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Standalone {
            config,
            port,
            data_dir,
            deploy_timeout,
        } => {
            let mut cfg = match &config {
                Some(path) => BerthConfig::from_file(path)?,
                None => BerthConfig::default(),
            };
            if let Some(port) = port {
                cfg.server.port = port;
            }
            if let Some(data_dir) = data_dir {
                cfg.server.data_dir = data_dir;
            }
            if let Some(timeout) = deploy_timeout {
                if parse_duration(&timeout).is_none() {
                    anyhow::bail!("--deploy-timeout: unparseable duration '{timeout}'");
                }
                cfg.deploy.timeout = timeout;
            }
            cfg.validate()?;
            standalone::run(cfg).await
        }
        Command::CheckConfig { file } => {
            let cfg = BerthConfig::from_file(&file)?;
            print!("{}", cfg.to_toml_string()?);
            Ok(())
        }
    }
}
