//! Wraps rendered body markup into a complete document.

use crate::config::DocumentConfig;
use crate::utils::html::escape;

/// Fixed document shell; the body is inserted verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentAssembler {
    head: String,
}

impl DocumentAssembler {
    pub fn new(foreground: &str, background: &str, title: &str) -> Self {
        let mut head = format!(
            "<!doctype html><html style=\"color:{};background-color:{}\"><head>\
             <meta charset=\"utf-8\">\
             <meta http-equiv=\"X-UA-Compatible\" content=\"IE=edge\">",
            escape(foreground),
            escape(background),
        );
        if !title.is_empty() {
            head.push_str("<title>");
            head.push_str(&escape(title));
            head.push_str("</title>");
        }
        head.push_str("</head><body>");
        Self { head }
    }

    pub fn wrap(&self, body: &str) -> String {
        let mut document = String::with_capacity(self.head.len() + body.len() + 14);
        document.push_str(&self.head);
        document.push_str(body);
        document.push_str("</body></html>");
        document
    }
}

impl From<&DocumentConfig> for DocumentAssembler {
    fn from(config: &DocumentConfig) -> Self {
        Self::new(&config.foreground, &config.background, &config.title)
    }
}

impl Default for DocumentAssembler {
    fn default() -> Self {
        Self::from(&DocumentConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_shell() {
        assert_eq!(
            DocumentAssembler::default().wrap("<p>x</p>"),
            "<!doctype html><html style=\"color:white;background-color:#252526\"><head>\
             <meta charset=\"utf-8\"><meta http-equiv=\"X-UA-Compatible\" content=\"IE=edge\">\
             </head><body><p>x</p></body></html>"
        );
    }

    #[test]
    fn test_body_is_not_escaped() {
        let doc = DocumentAssembler::default().wrap("<script>a && b</script>");
        assert!(doc.contains("<body><script>a && b</script></body>"));
    }

    #[test]
    fn test_title_and_colors() {
        let doc = DocumentAssembler::new("black", "#fff", "A & B").wrap("");
        assert!(doc.contains("style=\"color:black;background-color:#fff\""));
        assert!(doc.contains("<title>A &amp; B</title></head>"));
        assert!(doc.ends_with("<body></body></html>"));
    }

    #[test]
    fn test_deterministic() {
        let assembler = DocumentAssembler::default();
        assert_eq!(assembler.wrap("same"), assembler.wrap("same"));
    }
}
