//! Kiln - a static site generator with themes, collections and incremental builds.

mod build;
mod cache;
mod cli;
mod config;
mod content;
mod error;
mod logger;
mod plugin;
mod render;
mod serve;
mod site;
mod theme;
mod url;
mod utils;
mod watch;

use anyhow::Result;
use build::{BuildReport, Builder, clean_site};
use clap::Parser;
use cli::{Cli, Commands};
use config::SiteConfig;
use serve::serve_site;

fn main() {
    let cli = Cli::parse();
    logger::set_verbose(cli.verbose);

    if let Err(err) = run(&cli) {
        log!("error"; "{:#}", err);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = SiteConfig::from_cli(cli)?;

    match &cli.command {
        Commands::Build { .. } => build_all(&config).map(|_| ()),
        Commands::Serve { .. } => {
            build_all(&config)?;
            serve_site(cli, &config)
        }
        Commands::Clean => {
            clean_site(&config)?;
            log!("clean"; "removed {}", config.destination().display());
            Ok(())
        }
    }
}

/// One full build with the default plugins.
fn build_all(config: &SiteConfig) -> Result<BuildReport> {
    let report = Builder::new(config.clone()).build()?;
    log!(
        "build";
        "done: {} in {:.2?}",
        config.destination().display(),
        report.elapsed
    );
    Ok(report)
}
