//! Starter files for watch mode.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::log;

pub const DEFAULT_SCRIPT: &str = r#"// Builds the model for the template.
// The value of the last expression is the model.
new {
    Name = "Welt",
    Items = new [] { "Alpha", "Beta", "Gamma" },
    Now = DateTime.Now
}
"#;

pub const DEFAULT_TEMPLATE: &str = r#"@model dynamic
<h1>Hello @Model.Name</h1>
<p>Now: @Model.Now</p>
<ul>
@foreach (var it in Model.Items) {<li>@it</li>}
</ul>
"#;

/// Write the default script and template into `dir`.
///
/// Existing files are left alone.
pub fn init(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

    for (name, content) in [("model.script", DEFAULT_SCRIPT), ("template.html", DEFAULT_TEMPLATE)] {
        let path = dir.join(name);
        if path.exists() {
            log!("init"; "{} already exists, skipped", path.display());
            continue;
        }
        fs::write(&path, content).with_context(|| format!("failed to write {}", path.display()))?;
        log!("init"; "created {}", path.display());
    }
    Ok(())
}
