//! Live mode: file watcher and stdin feed the session; the preview is
//! printed as a status block and written to the output file.
//!
//! ```text
//! notify ─► bridge thread ─┐
//! stdin  ─► key thread    ─┼─► SessionActor ─► RenderOrchestrator ─► display task
//! ctrl-c ─► handler       ─┘                                          (file + status)
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use rustc_hash::FxHashSet;
use tokio::sync::{mpsc, watch};

use super::{WatchArgs, read_input, runtime};
use crate::config::SandboxConfig;
use crate::logger::{status_error, status_info, status_success};
use crate::render::{Preview, RenderGeneration, RenderOrchestrator, Status};
use crate::session::{self, SessionMsg};
use crate::{debug, log};

pub fn watch(args: &WatchArgs, config: &SandboxConfig) -> Result<()> {
    runtime()?.block_on(run(args, config))
}

async fn run(args: &WatchArgs, config: &SandboxConfig) -> Result<()> {
    let inputs = Inputs::resolve(&args.input.script, &args.input.template)?;

    let orchestrator = Arc::new(RenderOrchestrator::from_config(config));
    let display = tokio::spawn(display(orchestrator.subscribe(), args.output.clone()));
    let (tx, session) = session::spawn(
        Arc::clone(&orchestrator),
        config.render.debounce(),
        config.render.auto_render,
    );

    // Watcher first, so edits made while loading are not lost
    let _watcher = watch_inputs(inputs.clone(), tx.clone())?;

    tx.send(SessionMsg::ScriptChanged(read_input(&inputs.script)?))
        .await
        .context("session stopped")?;
    tx.send(SessionMsg::TemplateChanged(read_input(&inputs.template)?))
        .await
        .context("session stopped")?;
    tx.send(SessionMsg::RenderNow)
        .await
        .context("session stopped")?;

    let ctrlc_tx = tx.clone();
    ctrlc::set_handler(move || {
        let _ = ctrlc_tx.blocking_send(SessionMsg::Shutdown);
    })
    .context("failed to set Ctrl+C handler")?;

    spawn_keys(tx, config.render.auto_render);

    log!("watch"; "watching {} and {}", args.input.script.display(), args.input.template.display());
    log!("watch"; "enter: render, a: toggle auto-render, q: quit");

    session.await.context("session task failed")?;
    display.abort();
    log!("watch"; "stopped");
    Ok(())
}

// ============================================================================
// File watching
// ============================================================================

/// Canonical paths of the two watched files.
#[derive(Debug, Clone)]
struct Inputs {
    script: PathBuf,
    template: PathBuf,
}

impl Inputs {
    fn resolve(script: &Path, template: &Path) -> Result<Self> {
        let canonical = |path: &Path| {
            fs::canonicalize(path).with_context(|| {
                format!("cannot watch {} (run `sandbox init` to create it)", path.display())
            })
        };
        Ok(Self {
            script: canonical(script)?,
            template: canonical(template)?,
        })
    }

    /// Parent directories to watch. Editors may replace a file on save.
    fn roots(&self) -> FxHashSet<PathBuf> {
        [&self.script, &self.template]
            .into_iter()
            .filter_map(|path| path.parent().map(Path::to_path_buf))
            .collect()
    }

    /// Message for a changed path, if it is one of ours and readable.
    fn message_for(&self, path: &Path) -> Option<SessionMsg> {
        let is_script = same_file(path, &self.script);
        if !is_script && !same_file(path, &self.template) {
            return None;
        }
        let target = if is_script { &self.script } else { &self.template };
        match fs::read_to_string(target) {
            Ok(text) if is_script => Some(SessionMsg::ScriptChanged(text)),
            Ok(text) => Some(SessionMsg::TemplateChanged(text)),
            Err(e) => {
                debug!("watch"; "skipping {}: {}", target.display(), e);
                None
            }
        }
    }
}

/// Match by file name and canonical parent; the file itself may be gone.
fn same_file(path: &Path, target: &Path) -> bool {
    if path == target {
        return true;
    }
    path.file_name() == target.file_name()
        && path
            .parent()
            .and_then(|parent| fs::canonicalize(parent).ok())
            .is_some_and(|parent| Some(parent.as_path()) == target.parent())
}

/// Start the watcher and the thread bridging its events into the session.
fn watch_inputs(inputs: Inputs, tx: mpsc::Sender<SessionMsg>) -> Result<RecommendedWatcher> {
    let (notify_tx, notify_rx) = std::sync::mpsc::channel::<notify::Result<notify::Event>>();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        let _ = notify_tx.send(res);
    })
    .context("failed to create file watcher")?;

    for root in inputs.roots() {
        watcher
            .watch(&root, RecursiveMode::NonRecursive)
            .with_context(|| format!("failed to watch {}", root.display()))?;
    }

    std::thread::spawn(move || {
        while let Ok(result) = notify_rx.recv() {
            let event = match result {
                Ok(event) => event,
                Err(e) => {
                    log!("watch"; "notify error: {}", e);
                    continue;
                }
            };
            if matches!(event.kind, EventKind::Access(_)) {
                continue;
            }
            for msg in event.paths.iter().filter_map(|path| inputs.message_for(path)) {
                if tx.blocking_send(msg).is_err() {
                    return; // Session stopped
                }
            }
        }
    });

    Ok(watcher)
}

// ============================================================================
// Keys and display
// ============================================================================

/// Line-based commands from stdin.
fn spawn_keys(tx: mpsc::Sender<SessionMsg>, auto_render: bool) {
    std::thread::spawn(move || {
        let mut auto_render = auto_render;
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            let msg = match line.trim() {
                "" | "r" => SessionMsg::RenderNow,
                "a" => {
                    auto_render = !auto_render;
                    SessionMsg::SetAutoRender(auto_render)
                }
                "q" => SessionMsg::Shutdown,
                other => {
                    log!("watch"; "unknown command `{}`", other);
                    continue;
                }
            };
            if tx.blocking_send(msg).is_err() {
                break;
            }
        }
    });
}

/// Mirror the preview: status block on the terminal, document on disk.
///
/// Updates may coalesce, so the document is written whenever its generation
/// differs from the last one written, whatever the current status says.
async fn display(mut rx: watch::Receiver<Preview>, output: PathBuf) {
    let mut written: Option<RenderGeneration> = None;

    while rx.changed().await.is_ok() {
        let preview = rx.borrow_and_update().clone();

        if let Some(document) = &preview.document
            && preview.generation != written
        {
            written = preview.generation;
            if let Err(e) = fs::write(&output, document) {
                status_error(&format!("failed to write {}", output.display()), &e.to_string());
                continue;
            }
        }

        match &preview.status {
            Status::Rendered(_) => {
                status_success(&format!("{} → {}", preview.status, output.display()));
            }
            Status::ScriptError | Status::TemplateError | Status::Error => {
                status_error(&preview.status.to_string(), &preview.error);
            }
            status => status_info(&status.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{FailureKind, RenderOutcome};
    use tempfile::TempDir;

    fn inputs(dir: &Path) -> Inputs {
        fs::write(dir.join("model.script"), "new { A = 1 }").unwrap();
        fs::write(dir.join("template.html"), "<p>@Model.A</p>").unwrap();
        Inputs::resolve(&dir.join("model.script"), &dir.join("template.html")).unwrap()
    }

    #[test]
    fn test_missing_input_suggests_init() {
        let dir = TempDir::new().unwrap();
        let err = Inputs::resolve(&dir.path().join("a"), &dir.path().join("b")).unwrap_err();
        assert!(err.to_string().contains("sandbox init"));
    }

    #[test]
    fn test_message_for_matches_own_files() {
        let dir = TempDir::new().unwrap();
        let inputs = inputs(dir.path());
        assert_eq!(inputs.roots().len(), 1);

        assert_eq!(
            inputs.message_for(&dir.path().join("model.script")),
            Some(SessionMsg::ScriptChanged("new { A = 1 }".into()))
        );
        assert_eq!(
            inputs.message_for(&dir.path().join("template.html")),
            Some(SessionMsg::TemplateChanged("<p>@Model.A</p>".into()))
        );
        assert_eq!(inputs.message_for(&dir.path().join("other.txt")), None);
    }

    #[test]
    fn test_removed_file_is_skipped() {
        let dir = TempDir::new().unwrap();
        let inputs = inputs(dir.path());
        fs::remove_file(dir.path().join("template.html")).unwrap();
        assert_eq!(inputs.message_for(&dir.path().join("template.html")), None);
    }

    #[tokio::test]
    async fn test_display_writes_only_successful_renders() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("preview.html");
        let orchestrator = Arc::new(RenderOrchestrator::from_config(&SandboxConfig::default()));
        let task = tokio::spawn(display(orchestrator.subscribe(), output.clone()));

        orchestrator
            .render("new { A = 1 }".into(), "<p>@Model.A</p>".into())
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let first = fs::read_to_string(&output).unwrap();
        assert!(first.contains("<p>1</p>"));

        orchestrator
            .render("new {".into(), "<p>@Model.A</p>".into())
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(fs::read_to_string(&output).unwrap(), first);

        task.abort();
    }

    #[tokio::test]
    async fn test_display_keeps_document_of_coalesced_success() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("preview.html");
        let orchestrator = RenderOrchestrator::from_config(&SandboxConfig::default());
        let rx = orchestrator.subscribe();

        // Both updates land before the display task first looks
        let first = orchestrator.begin();
        assert!(orchestrator.publish(first, &RenderOutcome::Displayed("<p>one</p>".into())));
        let second = orchestrator.begin();
        assert!(orchestrator.publish(
            second,
            &RenderOutcome::Failed(FailureKind::ScriptError, "(1,1): error: boom".into())
        ));

        let task = tokio::spawn(display(rx, output.clone()));
        let written = tokio::time::timeout(std::time::Duration::from_secs(5), async {
            loop {
                match fs::read_to_string(&output) {
                    Ok(text) if !text.is_empty() => return text,
                    _ => tokio::time::sleep(std::time::Duration::from_millis(10)).await,
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(written, "<p>one</p>");

        task.abort();
    }
}
