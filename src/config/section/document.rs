//! `[document]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [document]
//! foreground = "white"        # CSS text color of the preview
//! background = "#252526"      # CSS background color of the preview
//! title = ""                  # Document title, empty for none
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    pub foreground: String,
    pub background: String,
    pub title: String,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            foreground: "white".to_string(),
            background: "#252526".to_string(),
            title: String::new(),
        }
    }
}

impl DocumentConfig {
    pub(in crate::config) fn validate(&self, errors: &mut Vec<String>) {
        for (field, value) in [("foreground", &self.foreground), ("background", &self.background)] {
            if value.trim().is_empty() {
                errors.push(format!("[document] {field} must not be empty"));
            } else if value.contains([';', '"', '<', '>', '{', '}']) {
                errors.push(format!("[document] {field} `{value}` is not a CSS color"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::test_parse_config;

    #[test]
    fn test_document_config() {
        let config = test_parse_config("[document]\nbackground = \"black\"\ntitle = \"Preview\"");
        assert_eq!(config.document.foreground, "white");
        assert_eq!(config.document.background, "black");
        assert_eq!(config.document.title, "Preview");
    }
}
