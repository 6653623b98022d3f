//! Content-derived template cache keys using blake3.

/// A 256-bit digest of the full template text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TemplateKey([u8; 32]);

impl TemplateKey {
    /// Key for `source`; identical text always yields the same key.
    pub fn of(source: &str) -> Self {
        Self(*blake3::hash(source.as_bytes()).as_bytes())
    }

    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Display for TemplateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // first 16 hex chars
        write!(f, "{}", &self.to_hex()[..16])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_content_derived() {
        assert_eq!(TemplateKey::of("<p>@Model.Name</p>"), TemplateKey::of("<p>@Model.Name</p>"));
        assert_ne!(TemplateKey::of("<p>@Model.Name</p>"), TemplateKey::of("<p>@Model.Name </p>"));
        assert_ne!(TemplateKey::of(""), TemplateKey::of(" "));
    }

    #[test]
    fn test_key_display() {
        let key = TemplateKey::of("x");
        assert_eq!(key.to_string().len(), 16);
        assert!(key.to_hex().starts_with(&key.to_string()));
        assert_eq!(key.as_bytes().len(), 32);
    }
}
