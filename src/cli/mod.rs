//! Command-line interface module.

mod args;
pub mod init;
pub mod render;
pub mod watch;

pub use args::{Cli, Commands, InputArgs, RenderArgs, WatchArgs};

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// Read one of the two live buffers.
fn read_input(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")
}
