//! Command-line interface definitions.
//!
//! Defines all CLI arguments and subcommands using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Kiln static site generator CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Site source directory
    #[arg(short, long)]
    pub source: Option<PathBuf>,

    /// Config file name (relative to the source directory)
    #[arg(short = 'C', long, default_value = "_config.toml")]
    pub config: PathBuf,

    /// Print debug output and the timing summary
    #[arg(short, long)]
    pub verbose: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Shared build arguments for Build and Serve commands
#[derive(clap::Args, Debug, Clone, Default)]
pub struct BuildArgs {
    /// Output directory (relative to the source directory)
    #[arg(short, long)]
    pub destination: Option<PathBuf>,

    /// Render posts from the drafts directory and unpublished documents
    #[arg(short = 'D', long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
    pub drafts: Option<bool>,

    /// Render posts dated in the future
    #[arg(long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
    pub future: Option<bool>,

    /// Clean the destination before building (ignored when incremental)
    #[arg(long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
    pub clean: Option<bool>,

    /// Only re-render documents that changed since the last build
    #[arg(short = 'I', long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
    pub incremental: Option<bool>,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Build the site into the destination directory
    Build {
        #[command(flatten)]
        build_args: BuildArgs,
    },

    /// Build, then serve the site. Rebuild and reload on change automatically
    Serve {
        #[command(flatten)]
        build_args: BuildArgs,

        /// Interface to bind on
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// HTTP port
        #[arg(short, long)]
        port: Option<u16>,

        /// Live reload websocket port
        #[arg(long = "livereload-port")]
        livereload_port: Option<u16>,

        /// Do not watch the source tree
        #[arg(long = "no-watch")]
        no_watch: bool,
    },

    /// Remove the destination directory and the build cache
    Clean,
}

impl Cli {
    /// Build arguments of the current command, if it takes any.
    pub fn build_args(&self) -> Option<&BuildArgs> {
        match &self.command {
            Commands::Build { build_args } | Commands::Serve { build_args, .. } => Some(build_args),
            Commands::Clean => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_build_flags() {
        let cli = Cli::parse_from(["kiln", "build", "--drafts", "--incremental=true"]);
        let args = cli.build_args().unwrap();
        assert_eq!(args.drafts, Some(true));
        assert_eq!(args.incremental, Some(true));
        assert_eq!(args.future, None);
        assert!(matches!(cli.command, Commands::Build { .. }));
    }

    #[test]
    fn test_parse_serve_overrides() {
        let cli = Cli::parse_from([
            "kiln", "-s", "site", "serve", "-p", "8080", "--livereload-port", "9000", "--no-watch",
        ]);
        assert_eq!(cli.source, Some(PathBuf::from("site")));
        match cli.command {
            Commands::Serve {
                port,
                livereload_port,
                no_watch,
                ..
            } => {
                assert_eq!(port, Some(8080));
                assert_eq!(livereload_port, Some(9000));
                assert!(no_watch);
            }
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn test_clean_has_no_build_args() {
        let cli = Cli::parse_from(["kiln", "clean"]);
        assert!(matches!(cli.command, Commands::Clean));
        assert!(cli.build_args().is_none());
        assert_eq!(cli.config, PathBuf::from("_config.toml"));
    }
}
