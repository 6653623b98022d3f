//! One-shot render: read both files, run the pipeline once, exit.

use std::fs;
use std::io::Write;

use anyhow::{Context, Result, anyhow, bail};

use super::{RenderArgs, read_input, runtime};
use crate::config::SandboxConfig;
use crate::log;
use crate::render::{RenderOrchestrator, RenderOutcome, Status};

/// Render once. A failed render is returned as an error carrying the
/// categorized detail, so the process exits non-zero.
pub fn render_once(args: &RenderArgs, config: &SandboxConfig) -> Result<()> {
    let script = read_input(&args.input.script)?;
    let template = read_input(&args.input.template)?;

    let orchestrator = RenderOrchestrator::from_config(config);
    let outcome = runtime()?.block_on(orchestrator.render(script, template));

    let document = match outcome {
        Some(RenderOutcome::Displayed(document)) => document,
        Some(RenderOutcome::Failed(kind, detail)) => {
            return Err(anyhow!(detail).context(Status::from(kind)));
        }
        None => bail!("render was superseded"),
    };

    match &args.output {
        Some(path) => {
            fs::write(path, &document)
                .with_context(|| format!("failed to write {}", path.display()))?;
            log!("render"; "wrote {}", path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(document.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}
