//! Template sandbox - script a model, render a template against it, live.

#![allow(dead_code)]

mod cli;
mod config;
mod document;
mod logger;
mod render;
mod script;
mod session;
mod template;
mod utils;

use std::path::Path;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands};
use config::SandboxConfig;

fn main() -> Result<()> {
    let cli: &'static Cli = Box::leak(Box::new(Cli::parse()));

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(cli.verbose);

    match &cli.command {
        Commands::Init { dir } => cli::init::init(dir.as_deref().unwrap_or(Path::new("."))),
        Commands::Render(args) => cli::render::render_once(args, &SandboxConfig::load(cli)?),
        Commands::Watch(args) => cli::watch::watch(args, &SandboxConfig::load(cli)?),
    }
}
