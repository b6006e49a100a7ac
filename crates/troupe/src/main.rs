//! troupe - streaming agent persona server.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use log::{LevelFilter, info};
use tokio::net::TcpListener;

use troupe::api::{self, AppState};
use troupe::completion::CompletionClient;
use troupe::settings::Settings;

const APP_NAME: &str = "troupe";

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.common)?;

    match cli.command {
        Command::Serve(cmd) => async_serve(cli.common, cmd),
        Command::Config { command } => handle_config(&cli.common, command),
        Command::Completions { shell } => handle_completions(shell),
    }
}

#[tokio::main]
async fn async_serve(common: CommonOpts, cmd: ServeCommand) -> Result<()> {
    handle_serve(common, cmd).await
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Troupe - streaming agent persona server.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Override the config file path
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Reduce output to only errors
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,
    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Enable debug logging (equivalent to -v)
    #[arg(long, global = true)]
    debug: bool,
    /// Enable trace logging (overrides other levels)
    #[arg(long, global = true)]
    trace: bool,
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the server
    Serve(ServeCommand),

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

#[derive(Debug, Args)]
struct ServeCommand {
    /// Override the listen host
    #[arg(long)]
    host: Option<String>,
    /// Override the listen port
    #[arg(long)]
    port: Option<u16>,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    Show,
}

fn effective_log_level(common: &CommonOpts) -> LevelFilter {
    if common.quiet {
        LevelFilter::Error
    } else if common.trace {
        LevelFilter::Trace
    } else if common.debug || common.verbose >= 1 {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

fn init_logging(common: &CommonOpts) -> Result<()> {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let level = match effective_log_level(common) {
        LevelFilter::Off => "off",
        LevelFilter::Error => "error",
        LevelFilter::Warn => "warn",
        LevelFilter::Info => "info",
        LevelFilter::Debug => "debug",
        LevelFilter::Trace => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("troupe={level},tower_http={level}")));

    if common.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_ansi(io::stderr().is_terminal()))
            .try_init()
            .ok();
    }

    // Also init env_logger for compatibility with log crate call sites.
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.filter_level(effective_log_level(common));
    builder.try_init().ok();

    Ok(())
}

async fn handle_serve(common: CommonOpts, cmd: ServeCommand) -> Result<()> {
    let mut settings = Settings::load(common.config.as_deref())?;
    if let Some(host) = cmd.host {
        settings.server.host = host;
    }
    if let Some(port) = cmd.port {
        settings.server.port = port;
    }

    let completion =
        CompletionClient::from_settings(&settings.provider).context("initializing completion client")?;

    let addr = settings.bind_addr()?;
    let state = AppState::new(Arc::new(completion), settings);
    let router = api::create_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    info!("listening on {addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving")?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

fn handle_config(common: &CommonOpts, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Init { force } => {
            let path = match &common.config {
                Some(path) => path.clone(),
                None => Settings::default_config_path()
                    .context("could not determine a config directory")?,
            };

            if path.exists() && !force {
                anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }

            let rendered = Settings::default().to_toml()?;
            std::fs::write(&path, rendered)
                .with_context(|| format!("writing {}", path.display()))?;
            println!("wrote {}", path.display());
            Ok(())
        }
        ConfigCommand::Show => {
            let settings = Settings::load(common.config.as_deref())?;
            print!("{}", settings.to_toml()?);
            Ok(())
        }
    }
}

fn handle_completions(shell: Shell) -> Result<()> {
    clap_complete::generate(shell, &mut Cli::command(), APP_NAME, &mut io::stdout());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_log_level_flags() {
        let base = CommonOpts {
            config: None,
            quiet: false,
            verbose: 0,
            debug: false,
            trace: false,
            json: false,
        };
        assert_eq!(effective_log_level(&base), LevelFilter::Info);

        let quiet = CommonOpts {
            quiet: true,
            ..base.clone()
        };
        assert_eq!(effective_log_level(&quiet), LevelFilter::Error);

        let trace = CommonOpts {
            trace: true,
            ..base.clone()
        };
        assert_eq!(effective_log_level(&trace), LevelFilter::Trace);

        let verbose = CommonOpts {
            verbose: 1,
            ..base
        };
        assert_eq!(effective_log_level(&verbose), LevelFilter::Debug);
    }
}
