//! Configuration section definitions.
//!
//! | Module     | TOML Section   | Purpose                               |
//! |------------|----------------|---------------------------------------|
//! | `document` | `[document]`   | Document shell colors and title       |
//! | `render`   | `[render]`     | Debounce, auto-render, template cache |
//! | `script`   | `[script]`     | Enabled library modules               |

mod document;
mod render;
mod script;

pub use document::DocumentConfig;
pub use render::RenderConfig;
pub use script::ScriptConfig;
