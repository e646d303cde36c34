//! Body converters, selected by source extension.

use pulldown_cmark::{Options, Parser, html};

/// Turns a template-rendered body into output markup.
pub trait Converter: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this converter handles files with extension `ext`.
    fn matches(&self, ext: &str) -> bool;

    fn convert(&self, content: &str) -> String;
}

// ============================================================================
// Markdown
// ============================================================================

/// CommonMark plus tables, footnotes, strikethrough, task lists and smart
/// punctuation.
#[derive(Debug, Clone)]
pub struct MarkdownConverter {
    extensions: Vec<String>,
    options: Options,
}

impl MarkdownConverter {
    pub fn new(extensions: &[String]) -> Self {
        Self {
            extensions: extensions.iter().map(|e| e.to_ascii_lowercase()).collect(),
            options: Options::ENABLE_TABLES
                | Options::ENABLE_FOOTNOTES
                | Options::ENABLE_STRIKETHROUGH
                | Options::ENABLE_TASKLISTS
                | Options::ENABLE_SMART_PUNCTUATION,
        }
    }
}

impl Converter for MarkdownConverter {
    fn name(&self) -> &str {
        "markdown"
    }

    fn matches(&self, ext: &str) -> bool {
        let ext = ext.to_ascii_lowercase();
        self.extensions.iter().any(|e| *e == ext)
    }

    fn convert(&self, content: &str) -> String {
        markdown_to_html(content, self.options)
    }
}

/// Render Markdown with the given extensions enabled.
pub fn markdown_to_html(content: &str, options: Options) -> String {
    let parser = Parser::new_ext(content, options);
    let mut out = String::with_capacity(content.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

// ============================================================================
// Identity
// ============================================================================

/// Passes content through untouched. Matches every extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityConverter;

impl Converter for IdentityConverter {
    fn name(&self) -> &str {
        "identity"
    }

    fn matches(&self, _ext: &str) -> bool {
        true
    }

    fn convert(&self, content: &str) -> String {
        content.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markdown() -> MarkdownConverter {
        MarkdownConverter::new(&["md".to_owned(), "markdown".to_owned()])
    }

    #[test]
    fn test_markdown_matches_configured_extensions() {
        let md = markdown();
        assert!(md.matches("md"));
        assert!(md.matches("MD"));
        assert!(md.matches("markdown"));
        assert!(!md.matches("html"));
    }

    #[test]
    fn test_markdown_convert() {
        let html = markdown().convert("# Title\n\nSome *text*.");
        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.contains("<em>text</em>"));
    }

    #[test]
    fn test_markdown_extensions_enabled() {
        let html = markdown().convert("| a | b |\n|---|---|\n| 1 | 2 |\n\n~~gone~~\n\n- [x] done");
        assert!(html.contains("<table>"));
        assert!(html.contains("<del>gone</del>"));
        assert!(html.contains("checkbox"));
    }

    #[test]
    fn test_identity() {
        let id = IdentityConverter;
        assert!(id.matches("html"));
        assert_eq!(id.convert("<p>x</p>"), "<p>x</p>");
    }
}
