//! `[render]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [render]
//! debounce_ms = 500           # Quiet interval before an auto-render
//! auto_render = true          # Re-render on every edit
//! cache_capacity = 64         # Compiled templates kept in memory
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Milliseconds without edits before a debounced render fires.
    pub debounce_ms: u64,

    /// Render automatically after edits.
    pub auto_render: bool,

    /// Compiled templates kept before least-recently-used eviction.
    pub cache_capacity: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            auto_render: true,
            cache_capacity: 64,
        }
    }
}

impl RenderConfig {
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub(in crate::config) fn validate(&self, errors: &mut Vec<String>) {
        if self.debounce_ms == 0 {
            errors.push("[render] debounce_ms must be greater than 0".to_string());
        }
        if self.cache_capacity == 0 {
            errors.push("[render] cache_capacity must be greater than 0".to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::test_parse_config;

    #[test]
    fn test_render_config_defaults() {
        let config = test_parse_config("");
        assert_eq!(config.render.debounce_ms, 500);
        assert!(config.render.auto_render);
        assert_eq!(config.render.cache_capacity, 64);
    }

    #[test]
    fn test_render_config_partial_override() {
        let config = test_parse_config("[render]\ndebounce_ms = 250");
        assert_eq!(config.render.debounce().as_millis(), 250);
        // others keep defaults
        assert!(config.render.auto_render);
        assert_eq!(config.render.cache_capacity, 64);
    }
}
