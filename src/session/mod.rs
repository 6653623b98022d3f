//! Session Actor
//!
//! Owns the two live buffers and decides when to render.
//!
//! Architecture:
//! ```text
//! SessionMsg → buffers + Debouncer (pure timing) → RenderOrchestrator::begin
//!                                                  → spawned run + publish
//! ```
//!
//! Renders run on spawned tasks so edits keep flowing while one is in
//! flight; the orchestrator's generation check drops whichever finishes
//! out of order.

mod debouncer;
mod messages;

#[cfg(test)]
mod tests;

pub use messages::SessionMsg;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::debug;
use crate::render::{RenderOrchestrator, Status};
use debouncer::Debouncer;

/// Channel buffer size for session messages
pub const CHANNEL_BUFFER: usize = 32;

pub struct SessionActor {
    rx: mpsc::Receiver<SessionMsg>,
    orchestrator: Arc<RenderOrchestrator>,
    debouncer: Debouncer,
    script: String,
    template: String,
}

impl SessionActor {
    pub fn new(
        rx: mpsc::Receiver<SessionMsg>,
        orchestrator: Arc<RenderOrchestrator>,
        debounce: Duration,
        auto_render: bool,
    ) -> Self {
        Self {
            rx,
            orchestrator,
            debouncer: Debouncer::new(debounce, auto_render),
            script: String::new(),
            template: String::new(),
        }
    }

    /// Run the actor event loop until `Shutdown` or every sender is dropped.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                msg = self.rx.recv() => match msg {
                    Some(SessionMsg::Shutdown) | None => break,
                    Some(msg) => self.handle(msg),
                },
                _ = tokio::time::sleep(self.debouncer.sleep_duration()) => {
                    if self.debouncer.take_if_ready() {
                        self.trigger();
                    }
                }
            }
        }
        debug!("session"; "stopped");
    }

    fn handle(&mut self, msg: SessionMsg) {
        match msg {
            SessionMsg::ScriptChanged(text) => {
                if text != self.script {
                    self.script = text;
                    self.debouncer.notify();
                }
            }
            SessionMsg::TemplateChanged(text) => {
                if text != self.template {
                    self.template = text;
                    self.debouncer.notify();
                }
            }
            SessionMsg::SetAutoRender(enabled) => {
                self.debouncer.set_enabled(enabled);
                self.orchestrator.set_status(if enabled {
                    Status::AutoRenderOn
                } else {
                    Status::AutoRenderOff
                });
            }
            SessionMsg::RenderNow => {
                self.debouncer.clear();
                self.trigger();
            }
            SessionMsg::Shutdown => {}
        }
    }

    /// Issue a generation now, render on a separate task.
    fn trigger(&self) {
        let orchestrator = Arc::clone(&self.orchestrator);
        let generation = orchestrator.begin();
        let script = self.script.clone();
        let template = self.template.clone();
        tokio::spawn(async move {
            let outcome = orchestrator.run(generation, script, template).await;
            orchestrator.publish(generation, &outcome);
        });
    }
}

/// Spawn a session actor and return its mailbox.
pub fn spawn(
    orchestrator: Arc<RenderOrchestrator>,
    debounce: Duration,
    auto_render: bool,
) -> (mpsc::Sender<SessionMsg>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(CHANNEL_BUFFER);
    let actor = SessionActor::new(rx, orchestrator, debounce, auto_render);
    (tx, tokio::spawn(actor.run()))
}
