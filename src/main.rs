use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use kiln::config::Config;
use kiln::{MemoryRegistry, PluginSystem};

/// Kiln - discover, validate and load native plugins
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Plugin root directory (overrides the configuration)
    #[arg(short, long)]
    plugin_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan the plugin directories and list candidates
    Scan,
    /// Load the given plugin files, report them, and unload them again
    Load {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global default subscriber")?;

    let mut config = match &args.config {
        Some(path) => Config::load_from_file(path)?,
        None => Config::load_default()?,
    };
    if let Some(root) = args.plugin_root {
        config.plugin_root = root;
    }

    let system = PluginSystem::new(&config, MemoryRegistry::new());
    system
        .init()
        .context("Plugin system could not be started")?;

    let mut failed = 0;
    match args.command {
        Command::Scan => {
            system.with_registry(|registry| {
                for path in registry.paths() {
                    println!("{}", path.display());
                }
            });
        }
        Command::Load { paths } => {
            for path in &paths {
                match system.load_plugin(path) {
                    Ok(plugin) => {
                        let header = &plugin.header;
                        println!(
                            "{}\t{}\t{}\tABI {}",
                            plugin.id,
                            header.name().unwrap_or_else(|| path.display().to_string()),
                            header
                                .plugin_type()
                                .map_or_else(|| "unknown".to_string(), |t| t.to_string()),
                            header.version()
                        );
                    }
                    // Already logged by the loader
                    Err(_) => failed += 1,
                }
            }
            if failed > 0 {
                eprintln!("{} of {} plugins failed to load", failed, paths.len());
            }
        }
    }

    system.cleanup();
    if failed > 0 {
        anyhow::bail!("{} plugins failed to load", failed);
    }
    Ok(())
}
