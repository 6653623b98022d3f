//! `[script]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [script]
//! modules = ["collections", "sequence", "text", "math", "datetime"]
//! ```

use serde::{Deserialize, Serialize};

use crate::script::library::{Library, Module};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    /// Library modules scripts and templates may use.
    pub modules: Vec<String>,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            modules: Module::ALL.iter().map(|m| m.name().to_string()).collect(),
        }
    }
}

impl ScriptConfig {
    /// Library built from the configured modules, skipping unknown names.
    pub fn library(&self) -> Library {
        Library::new(self.modules.iter().filter_map(|name| name.parse().ok()))
    }

    pub(in crate::config) fn validate(&self, errors: &mut Vec<String>) {
        for name in &self.modules {
            if let Err(err) = name.parse::<Module>() {
                errors.push(format!("[script] {err}"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::test_parse_config;
    use crate::script::library::Module;

    #[test]
    fn test_default_enables_everything() {
        let config = test_parse_config("");
        assert_eq!(config.script.library().modules(), Module::ALL);
    }

    #[test]
    fn test_subset() {
        let config = test_parse_config("[script]\nmodules = [\"text\", \"math\"]");
        assert_eq!(config.script.library().modules(), [Module::Text, Module::Math]);
    }
}
