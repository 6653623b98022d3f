//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::path::PathBuf;

/// Live sandbox: script a model, render a template against it
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Config file path (default: sandbox.toml)
    #[arg(short = 'C', long, global = true, default_value = "sandbox.toml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Render once and exit
    #[command(visible_alias = "r")]
    Render(RenderArgs),

    /// Re-render whenever the script or template changes
    #[command(visible_alias = "w")]
    Watch(WatchArgs),

    /// Write the default script and template
    #[command(visible_alias = "i")]
    Init {
        /// Directory to create the files in (default: current directory)
        #[arg(value_hint = clap::ValueHint::DirPath)]
        dir: Option<PathBuf>,
    },
}

/// The two live buffers.
#[derive(clap::Args, Debug, Clone)]
pub struct InputArgs {
    /// Script producing the model
    #[arg(short, long, default_value = "model.script", value_hint = clap::ValueHint::FilePath)]
    pub script: PathBuf,

    /// Template rendered against the model
    #[arg(short, long, default_value = "template.html", value_hint = clap::ValueHint::FilePath)]
    pub template: PathBuf,
}

#[derive(clap::Args, Debug, Clone)]
pub struct RenderArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Write the document here instead of stdout
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    pub output: Option<PathBuf>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct WatchArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// File receiving the latest successfully rendered document
    #[arg(short, long, default_value = "preview.html", value_hint = clap::ValueHint::FilePath)]
    pub output: PathBuf,

    /// Quiet interval before an auto-render, overrides [render] debounce_ms
    #[arg(long)]
    pub debounce_ms: Option<u64>,

    /// Start with auto-render off; press Enter to render manually
    #[arg(long)]
    pub no_auto_render: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["sandbox", "render"]);
        let Commands::Render(args) = &cli.command else {
            panic!("expected render");
        };
        assert_eq!(args.input.script, PathBuf::from("model.script"));
        assert_eq!(args.input.template, PathBuf::from("template.html"));
        assert!(args.output.is_none());
        assert_eq!(cli.config, PathBuf::from("sandbox.toml"));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["sandbox", "watch", "-v", "-C", "x.toml", "--no-auto-render"]);
        assert!(cli.verbose);
        let Commands::Watch(args) = &cli.command else {
            panic!("expected watch");
        };
        assert!(args.no_auto_render);
        assert_eq!(args.output, PathBuf::from("preview.html"));
        assert_eq!(cli.config, PathBuf::from("x.toml"));
    }
}
