//! licenselink CLI.

mod cli;
mod cmd;
mod config;

use clap::Parser;
use cli::{Cli, Commands};
use licenselink_types::config::{LinkerConfig, SwhConfig};

fn init_tracing_stderr() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing_stderr();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to create Tokio runtime: {e}");
            std::process::exit(1);
        }
    };

    let Cli {
        config: config_file,
        command,
    } = cli;
    let config_path = config_file.as_deref();
    let result = rt.block_on(async {
        match command {
            Commands::Swh { listen } => {
                let mut config: SwhConfig = config::load_config(config_path);
                if let Some(listen) = listen {
                    config.listen_addr = listen;
                }
                cmd::serve::cmd_swh(config).await
            }
            Commands::Linker { listen } => {
                let mut config: LinkerConfig = config::load_config(config_path);
                if let Some(listen) = listen {
                    config.listen_addr = listen;
                }
                cmd::serve::cmd_linker(config).await
            }
            Commands::Request {
                swh,
                library,
                count,
                json,
            } => cmd::developer::cmd_request(&swh, &library, count, json).await,
            Commands::Redeem {
                swh,
                wrapped,
                identity,
                out,
            } => cmd::developer::cmd_redeem(&swh, &wrapped, &identity, &out).await,
            Commands::Link {
                linker,
                entry_point,
                licenses,
                files,
                out,
            } => cmd::developer::cmd_link(&linker, entry_point, licenses, &files, &out).await,
        }
    });

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
