//! Session Message Definitions
//!
//! ```text
//! watcher / stdin / ctrl-c --SessionMsg--> SessionActor --spawn--> render task
//! ```

/// Messages to the Session Actor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionMsg {
    /// Script buffer replaced wholesale
    ScriptChanged(String),
    /// Template buffer replaced wholesale
    TemplateChanged(String),
    /// Toggle debounced rendering on edits
    SetAutoRender(bool),
    /// Render immediately, bypassing the debounce
    RenderNow,
    /// Stop the actor
    Shutdown,
}
