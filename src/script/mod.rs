//! Model scripts: text in, [`Model`] out.
//!
//! The pipeline is lex → parse (chumsky, recovering per statement) → resolve
//! names → interpret. Every front-end diagnostic is collected before anything runs,
//! so a script with three typos reports all three.

pub mod ast;
pub mod diagnostic;
pub mod interp;
pub mod lexer;
pub mod library;
pub mod parser;
pub mod resolve;
pub mod value;

use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;

use diagnostic::render_all;
use interp::{Interpreter, Scope};
use library::Library;
use parser::parse_program;
use resolve::Resolver;

/// The value a script produces and a template consumes.
pub type Model = Value;

/// Object with no fields.
pub fn empty_model() -> Model {
    Value::Object(Map::new())
}

/// One or more positioned diagnostics, in source order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", diagnostics.join("\n"))]
pub struct EvalFailure {
    pub diagnostics: Vec<String>,
}

/// Evaluates scripts against a fixed capability [`Library`].
///
/// Holds no state between calls; clones share the library.
#[derive(Debug, Clone)]
pub struct ModelEvaluator {
    library: Arc<Library>,
}

impl ModelEvaluator {
    pub fn new(library: Arc<Library>) -> Self {
        Self { library }
    }

    pub fn evaluate(&self, script: &str) -> Result<Model, EvalFailure> {
        if script.trim().is_empty() {
            return Ok(empty_model());
        }

        let (program, mut diagnostics) = parse_program(script, 0);
        let mut resolver = Resolver::new(&self.library);
        resolver.program(&program);
        diagnostics.extend(resolver.finish());
        if !diagnostics.is_empty() {
            return Err(EvalFailure {
                diagnostics: render_all(diagnostics, script),
            });
        }

        let value = Interpreter::new(&self.library)
            .run(&program, &mut Scope::root())
            .map_err(|err| EvalFailure {
                diagnostics: render_all(vec![err.into()], script),
            })?;

        Ok(if value.is_null() { empty_model() } else { value })
    }
}

impl Default for ModelEvaluator {
    fn default() -> Self {
        Self::new(Arc::new(Library::standard()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use library::Module;
    use serde_json::json;

    #[test]
    fn test_blank_script_is_empty_model() {
        let evaluator = ModelEvaluator::default();
        assert_eq!(evaluator.evaluate("").unwrap(), json!({}));
        assert_eq!(evaluator.evaluate("   \n\t").unwrap(), json!({}));
        assert_eq!(evaluator.evaluate("let x = 1;").unwrap(), json!({}));
        assert_eq!(evaluator.evaluate("null").unwrap(), json!({}));
    }

    #[test]
    fn test_default_startup_script() {
        let script = r#"new
{
    Name = "Welt",
    Items = new [] { "Alpha", "Beta", "Gamma" },
    Now = DateTime.Now
}"#;
        let model = ModelEvaluator::default().evaluate(script).unwrap();
        assert_eq!(model["Name"], json!("Welt"));
        assert_eq!(model["Items"], json!(["Alpha", "Beta", "Gamma"]));
        assert!(model["Now"].as_str().is_some_and(|s| s.ends_with('Z')));
        let keys: Vec<_> = model.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, ["Name", "Items", "Now"]);
    }

    #[test]
    fn test_unmatched_brace_is_diagnostic() {
        let err = ModelEvaluator::default()
            .evaluate("new { Name = \"Welt\"")
            .unwrap_err();
        assert!(!err.diagnostics.is_empty());
        assert!(err.diagnostics[0].starts_with("(1,"));
    }

    #[test]
    fn test_deeply_nested_script_is_diagnostic() {
        let d = 150;
        let err = ModelEvaluator::default()
            .evaluate(&format!("{}1{}", "(".repeat(d), ")".repeat(d)))
            .unwrap_err();
        assert_eq!(err.diagnostics, vec!["(1,65): error: expression nested too deeply"]);

        let nested = format!("{}1{}", "(".repeat(30), ")".repeat(30));
        assert_eq!(ModelEvaluator::default().evaluate(&nested).unwrap(), json!(1));
    }

    #[test]
    fn test_diagnostics_in_source_order() {
        let err = ModelEvaluator::default()
            .evaluate("let a = missing;\nlet b = 1 +;\nalso_missing")
            .unwrap_err();
        assert_eq!(err.diagnostics.len(), 3);
        assert!(err.diagnostics[0].starts_with("(1,9): error: the name `missing`"));
        assert!(err.diagnostics[1].starts_with("(2,"));
        assert!(err.diagnostics[2].starts_with("(3,1): error: the name `also_missing`"));
    }

    #[test]
    fn test_runtime_error_positioned() {
        let err = ModelEvaluator::default().evaluate("let n = 0;\n10 / n").unwrap_err();
        assert_eq!(err.diagnostics, vec!["(2,1): error: attempted to divide by zero"]);
    }

    #[test]
    fn test_library_is_explicit() {
        let evaluator = ModelEvaluator::new(Arc::new(Library::new([Module::Text])));
        let err = evaluator.evaluate("Math.Abs(-1)").unwrap_err();
        assert!(err.diagnostics[0].contains("requires the `math` module"));
        assert_eq!(evaluator.evaluate(r#""a".ToUpper()"#).unwrap(), json!("A"));
    }
}
