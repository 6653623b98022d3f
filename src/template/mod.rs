//! Template engine: compile Razor-style text once, render it many times.
//!
//! Compilation checks syntax and names and is memoized by [`TemplateKey`].
//! Rendering evaluates the compiled nodes against a [`Model`].

pub mod cache;
pub mod key;
pub mod parser;
mod render;

use std::sync::Arc;

use thiserror::Error;

use crate::script::Model;
use crate::script::diagnostic::{Span, render_all};
use crate::script::interp::{Interpreter, Scope};
use crate::script::library::Library;
use crate::script::resolve::Resolver;

pub use cache::TemplateCache;
pub use key::TemplateKey;
use parser::{Node, parse_template, resolve_nodes};
use render::Renderer;

/// Every compiler diagnostic of a failed compile, in source order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", diagnostics.join("\n"))]
pub struct TemplateFailure {
    pub diagnostics: Vec<String>,
}

/// A failure while rendering a template that compiled fine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RenderError {
    pub message: String,
}

/// Ready-to-render form of one template text.
#[derive(Debug)]
pub struct CompiledTemplate {
    key: TemplateKey,
    source: String,
    nodes: Vec<Node>,
}

impl CompiledTemplate {
    pub fn key(&self) -> TemplateKey {
        self.key
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

pub struct TemplateEngine {
    library: Arc<Library>,
    cache: TemplateCache,
}

impl TemplateEngine {
    pub fn new(library: Arc<Library>, cache_capacity: usize) -> Self {
        Self {
            library,
            cache: TemplateCache::new(cache_capacity),
        }
    }

    pub fn cache(&self) -> &TemplateCache {
        &self.cache
    }

    /// Compile `source`, reusing the cached artifact when `key` and the
    /// text both match. Failed compiles are not cached.
    pub fn compile(
        &self,
        key: TemplateKey,
        source: &str,
    ) -> Result<Arc<CompiledTemplate>, TemplateFailure> {
        if let Some(hit) = self.cache.get(&key, source) {
            crate::debug!("cache"; "hit {}", key);
            return Ok(hit);
        }
        crate::debug!("cache"; "miss {}", key);

        let (nodes, mut diagnostics) = parse_template(source);
        let mut resolver = Resolver::new(&self.library);
        resolver.declare("Model", Span::default());
        resolve_nodes(&mut resolver, &nodes);
        diagnostics.extend(resolver.finish());

        if !diagnostics.is_empty() {
            return Err(TemplateFailure {
                diagnostics: render_all(diagnostics, source),
            });
        }

        let compiled = Arc::new(CompiledTemplate {
            key,
            source: source.to_string(),
            nodes,
        });
        self.cache.insert(Arc::clone(&compiled));
        crate::debug!("cache"; "insert {} ({}/{})", key, self.cache.len(), self.cache.capacity());
        Ok(compiled)
    }

    pub fn render(&self, template: &CompiledTemplate, model: &Model) -> Result<String, RenderError> {
        let mut scope = Scope::root();
        scope.set("Model", model.clone());

        let renderer = Renderer::new(Interpreter::new(&self.library));
        let mut out = String::with_capacity(template.source.len());
        renderer
            .nodes(&template.nodes, &mut scope, &mut out)
            .map_err(|err| RenderError {
                message: render_all(vec![err.into()], &template.source).join("\n"),
            })?;
        Ok(out)
    }
}
