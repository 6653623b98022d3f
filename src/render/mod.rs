//! Render orchestration: script → model → template → document.
//!
//! Each attempt gets a [`RenderGeneration`]. Attempts may overlap while
//! evaluating and rendering, but only the most recently issued generation
//! may publish, so an older attempt finishing late is dropped.
//!
//! ```text
//! begin() ──► run(): evaluate ─► compile+render ─► assemble ──► publish()
//!                      │              │                          │
//!                      ▼              ▼                          ▼
//!                 ScriptError   TemplateError /           stale? drop
//!                               UnknownError
//! ```

mod error;

pub use error::{FailureKind, StageError};

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::config::SandboxConfig;
use crate::debug;
use crate::document::DocumentAssembler;
use crate::script::ModelEvaluator;
use crate::template::{TemplateEngine, TemplateKey};
use crate::utils::date::DateTimeUtc;

/// Monotonic identifier of one render attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct RenderGeneration(u64);

impl RenderGeneration {
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RenderGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    Displayed(String),
    Failed(FailureKind, String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Idle,
    Running,
    /// `HH:MM:SS` of the successful render.
    Rendered(String),
    ScriptError,
    TemplateError,
    Error,
    AutoRenderOn,
    AutoRenderOff,
}

impl From<FailureKind> for Status {
    fn from(kind: FailureKind) -> Self {
        match kind {
            FailureKind::ScriptError => Self::ScriptError,
            FailureKind::TemplateError => Self::TemplateError,
            FailureKind::UnknownError => Self::Error,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Running => f.write_str("rendering…"),
            Self::Rendered(at) => write!(f, "rendered at {at}"),
            Self::ScriptError => f.write_str("script evaluation failed"),
            Self::TemplateError => f.write_str("template compilation failed"),
            Self::Error => f.write_str("render failed"),
            Self::AutoRenderOn => f.write_str("auto-render on"),
            Self::AutoRenderOff => f.write_str("auto-render off"),
        }
    }
}

/// What the display side observes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub status: Status,
    /// Empty unless the last published outcome failed.
    pub error: String,
    /// Last successfully rendered document; kept across failures.
    pub document: Option<String>,
    /// Generation that produced `document`.
    pub generation: Option<RenderGeneration>,
}

impl Default for Preview {
    fn default() -> Self {
        Self {
            status: Status::Idle,
            error: String::new(),
            document: None,
            generation: None,
        }
    }
}

pub struct RenderOrchestrator {
    evaluator: ModelEvaluator,
    engine: Arc<TemplateEngine>,
    assembler: DocumentAssembler,
    /// Latest issued generation; held while publishing.
    latest: Mutex<RenderGeneration>,
    preview: watch::Sender<Preview>,
}

impl RenderOrchestrator {
    pub fn new(
        evaluator: ModelEvaluator,
        engine: Arc<TemplateEngine>,
        assembler: DocumentAssembler,
    ) -> Self {
        Self {
            evaluator,
            engine,
            assembler,
            latest: Mutex::new(RenderGeneration::default()),
            preview: watch::Sender::new(Preview::default()),
        }
    }

    pub fn from_config(config: &SandboxConfig) -> Self {
        let library = Arc::new(config.library());
        let engine = TemplateEngine::new(Arc::clone(&library), config.render.cache_capacity);
        Self::new(
            ModelEvaluator::new(library),
            Arc::new(engine),
            DocumentAssembler::from(&config.document),
        )
    }

    pub fn subscribe(&self) -> watch::Receiver<Preview> {
        self.preview.subscribe()
    }

    pub fn preview(&self) -> Preview {
        self.preview.borrow().clone()
    }

    pub fn engine(&self) -> &TemplateEngine {
        &self.engine
    }

    /// Most recently issued generation (zero before the first render).
    pub fn latest_generation(&self) -> RenderGeneration {
        *self.latest.lock()
    }

    /// Publish a status that is not tied to a render (auto-render toggles).
    pub fn set_status(&self, status: Status) {
        self.preview.send_modify(|preview| preview.status = status);
    }

    /// Issue the next generation and mark the preview as running.
    pub fn begin(&self) -> RenderGeneration {
        let mut latest = self.latest.lock();
        *latest = RenderGeneration(latest.0 + 1);
        let generation = *latest;
        self.preview.send_modify(|preview| {
            preview.status = Status::Running;
            preview.error.clear();
        });
        debug!("render"; "begin {}", generation);
        generation
    }

    /// Run the pipeline. Never publishes.
    pub async fn run(&self, generation: RenderGeneration, script: String, template: String) -> RenderOutcome {
        let started = Instant::now();
        match self.pipeline(generation, script, template).await {
            Ok(document) => {
                debug!("render"; "{} done in {:?}", generation, started.elapsed());
                RenderOutcome::Displayed(document)
            }
            Err(err) => {
                let kind = err.kind();
                debug!("render"; "{} failed ({}) after {:?}", generation, kind, started.elapsed());
                RenderOutcome::Failed(kind, err.to_string())
            }
        }
    }

    async fn pipeline(
        &self,
        generation: RenderGeneration,
        script: String,
        template: String,
    ) -> Result<String, StageError> {
        let stage = Instant::now();
        let evaluator = self.evaluator.clone();
        let model = tokio::task::spawn_blocking(move || evaluator.evaluate(&script)).await??;
        debug!("render"; "{} evaluated in {:?}", generation, stage.elapsed());

        let stage = Instant::now();
        let engine = Arc::clone(&self.engine);
        let body = tokio::task::spawn_blocking(move || -> Result<String, StageError> {
            let key = TemplateKey::of(&template);
            let compiled = engine.compile(key, &template)?;
            Ok(engine.render(&compiled, &model)?)
        })
        .await??;
        debug!("render"; "{} rendered in {:?}", generation, stage.elapsed());

        Ok(self.assembler.wrap(&body))
    }

    /// Publish `outcome` if `generation` is still the latest issued.
    pub fn publish(&self, generation: RenderGeneration, outcome: &RenderOutcome) -> bool {
        let latest = self.latest.lock();
        if generation != *latest {
            debug!("render"; "dropping stale {} (latest {})", generation, *latest);
            return false;
        }

        self.preview.send_modify(|preview| match outcome {
            RenderOutcome::Displayed(document) => {
                preview.status = Status::Rendered(DateTimeUtc::now().to_time_string());
                preview.error.clear();
                preview.document = Some(document.clone());
                preview.generation = Some(generation);
            }
            RenderOutcome::Failed(kind, detail) => {
                preview.status = Status::from(*kind);
                preview.error.clone_from(detail);
            }
        });
        true
    }

    /// `begin` + `run` + `publish`; `None` when superseded.
    pub async fn render(&self, script: String, template: String) -> Option<RenderOutcome> {
        let generation = self.begin();
        let outcome = self.run(generation, script, template).await;
        self.publish(generation, &outcome).then_some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = r#"new { Name = "Welt", Items = ["Alpha","Beta"] }"#;
    const TEMPLATE: &str =
        "<h1>Hello @Model.Name</h1><ul>@foreach it in Model.Items {<li>@it</li>}</ul>";

    fn orchestrator() -> RenderOrchestrator {
        RenderOrchestrator::from_config(&SandboxConfig::default())
    }

    fn document(outcome: &RenderOutcome) -> &str {
        match outcome {
            RenderOutcome::Displayed(document) => document,
            RenderOutcome::Failed(kind, detail) => panic!("{kind}: {detail}"),
        }
    }

    #[tokio::test]
    async fn test_hello_world_displayed() {
        let orchestrator = orchestrator();
        let outcome = orchestrator
            .render(SCRIPT.into(), TEMPLATE.into())
            .await
            .unwrap();
        let doc = document(&outcome);
        let hello = doc.find("Hello Welt").unwrap();
        let alpha = doc.find("<li>Alpha</li>").unwrap();
        let beta = doc.find("<li>Beta</li>").unwrap();
        assert!(hello < alpha && alpha < beta);
        assert!(doc.starts_with("<!doctype html>"));

        let preview = orchestrator.preview();
        assert!(matches!(preview.status, Status::Rendered(_)));
        assert!(preview.error.is_empty());
        assert_eq!(preview.document.as_deref(), Some(doc));
    }

    #[tokio::test]
    async fn test_idempotent() {
        let orchestrator = orchestrator();
        let first = orchestrator.render(SCRIPT.into(), TEMPLATE.into()).await;
        let second = orchestrator.render(SCRIPT.into(), TEMPLATE.into()).await;
        assert_eq!(first, second);
        assert_eq!(orchestrator.engine().cache().len(), 1);
    }

    #[tokio::test]
    async fn test_script_error_keeps_previous_document() {
        let orchestrator = orchestrator();
        orchestrator.render(SCRIPT.into(), TEMPLATE.into()).await.unwrap();
        let before = orchestrator.preview().document;

        let outcome = orchestrator
            .render("new { Name = \"Welt\"".into(), TEMPLATE.into())
            .await
            .unwrap();
        let RenderOutcome::Failed(FailureKind::ScriptError, detail) = outcome else {
            panic!("expected script error, got {outcome:?}");
        };
        assert!(detail.starts_with("script error:\n("));

        let preview = orchestrator.preview();
        assert_eq!(preview.status, Status::ScriptError);
        assert_eq!(preview.error, detail);
        assert_eq!(preview.document, before);
    }

    #[tokio::test]
    async fn test_template_error() {
        let outcome = orchestrator()
            .render(SCRIPT.into(), "<p>@foreach it Model.Items {x}</p>".into())
            .await
            .unwrap();
        assert!(matches!(outcome, RenderOutcome::Failed(FailureKind::TemplateError, _)));
    }

    #[tokio::test]
    async fn test_render_time_failure_is_unknown() {
        let outcome = orchestrator()
            .render("new { N = 3 }".into(), "@foreach x in Model.N {x}".into())
            .await
            .unwrap();
        let RenderOutcome::Failed(FailureKind::UnknownError, detail) = outcome else {
            panic!("expected unknown error, got {outcome:?}");
        };
        assert!(detail.contains("cannot iterate"));
    }

    #[tokio::test]
    async fn test_empty_script_renders_with_empty_model() {
        let outcome = orchestrator()
            .render("   ".into(), "<p>[@Model.Name]</p>".into())
            .await
            .unwrap();
        assert!(document(&outcome).contains("<body><p>[]</p></body>"));
    }

    #[tokio::test]
    async fn test_stale_generation_dropped() {
        let orchestrator = orchestrator();
        let a = orchestrator.begin();
        let b = orchestrator.begin();
        assert!(a < b);

        // B finishes first and publishes
        let outcome_b = orchestrator
            .run(b, SCRIPT.into(), "<p>B</p>".into())
            .await;
        assert!(orchestrator.publish(b, &outcome_b));

        // A finishes later and is dropped
        let outcome_a = orchestrator
            .run(a, SCRIPT.into(), "<p>A</p>".into())
            .await;
        assert!(!orchestrator.publish(a, &outcome_a));

        let preview = orchestrator.preview();
        assert!(preview.document.unwrap().contains("<p>B</p>"));
        assert_eq!(preview.generation, Some(b));
    }

    #[tokio::test]
    async fn test_failed_stale_render_cannot_clobber_status() {
        let orchestrator = orchestrator();
        let a = orchestrator.begin();
        let b = orchestrator.begin();
        let ok = orchestrator.run(b, SCRIPT.into(), TEMPLATE.into()).await;
        assert!(orchestrator.publish(b, &ok));
        let failed = orchestrator.run(a, "}".into(), TEMPLATE.into()).await;
        assert!(!orchestrator.publish(a, &failed));
        assert!(matches!(orchestrator.preview().status, Status::Rendered(_)));
    }

    #[tokio::test]
    async fn test_begin_marks_running_and_notifies() {
        let orchestrator = orchestrator();
        let mut rx = orchestrator.subscribe();
        orchestrator.begin();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().status, Status::Running);
        assert_eq!(Status::Running.to_string(), "rendering…");
    }
}
