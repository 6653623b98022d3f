//! Failure classification for render cycles.

use std::fmt;

use thiserror::Error;
use tokio::task::JoinError;

use crate::script::EvalFailure;
use crate::template::{RenderError, TemplateFailure};

/// The three mutually exclusive ways a render can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    ScriptError,
    TemplateError,
    UnknownError,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ScriptError => "script",
            Self::TemplateError => "template",
            Self::UnknownError => "unknown",
        })
    }
}

/// Error from one pipeline stage.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("script error:\n{0}")]
    Script(#[from] EvalFailure),

    #[error("template error:\n{0}")]
    Template(#[from] TemplateFailure),

    #[error("render error: {0}")]
    Render(#[from] RenderError),

    #[error("render task failed: {0}")]
    Task(#[from] JoinError),
}

impl StageError {
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::Script(_) => FailureKind::ScriptError,
            Self::Template(_) => FailureKind::TemplateError,
            Self::Render(_) | Self::Task(_) => FailureKind::UnknownError,
        }
    }
}
