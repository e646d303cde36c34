//! Document rendering.
//!
//! ```text
//! body ── template ──► converter (by extension) ──► layout ──► parent layout ──► …
//! ```
//!
//! A layout may name a parent layout in its own front matter. Cycles are a
//! render error; a missing layout is a warning and ends the chain.

pub mod context;
pub mod converter;
pub mod engine;
pub mod filters;

pub use converter::{Converter, IdentityConverter, MarkdownConverter};
pub use engine::{EngineCache, EngineOptions, JinjaEngine, StringFilter, TemplateEngine};

use crate::{content::Document, debug, error::RenderError, log, site::Site};
use regex::Regex;
use rustc_hash::FxHashSet;
use serde_json::{Value, json};
use std::{
    fs,
    path::PathBuf,
    sync::{Arc, LazyLock},
};

/// `{% include "name" %}` references, for dependency tracking.
static RE_INCLUDE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\{%-?\s*include\s+["']([^"']+)["']"#).unwrap());

/// Result of rendering one document.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub output: String,
    /// Layout chain files, then every include reached from them.
    pub dependencies: Vec<PathBuf>,
}

/// Renders documents of one site against one engine.
pub struct Renderer<'a> {
    site: &'a Site,
    engine: Arc<dyn TemplateEngine>,
    converters: Vec<Arc<dyn Converter>>,
    site_value: Value,
}

impl<'a> Renderer<'a> {
    /// `converters` are tried in order; the identity converter is the
    /// fallback when none matches.
    pub fn new(
        site: &'a Site,
        engine: Arc<dyn TemplateEngine>,
        converters: Vec<Arc<dyn Converter>>,
    ) -> Self {
        Self {
            site_value: context::site_value(site),
            site,
            engine,
            converters,
        }
    }

    /// Render `doc` through its template, converter and layout chain.
    pub fn render(
        &self,
        doc: &Document,
        previous: Option<&Document>,
        next: Option<&Document>,
    ) -> Result<Rendered, RenderError> {
        let page = context::page_value(doc, &doc.content, previous, next);
        let body = self.engine.render(
            &doc.relative_path,
            &doc.content,
            &json!({ "site": self.site_value, "page": page }),
        )?;
        let mut content = self.convert(doc, &body);

        let chain = self.layout_chain(doc)?;
        for layout in &chain {
            let page = context::page_value(doc, &content, previous, next);
            let layout_fm = serde_json::to_value(&layout.front_matter)?;
            content = self.engine.render(
                &layout.relative_path,
                &layout.content,
                &json!({
                    "site": self.site_value,
                    "page": page,
                    "content": content,
                    "layout": layout_fm,
                }),
            )?;
        }

        let mut dependencies: Vec<PathBuf> = chain.iter().map(|l| l.path.clone()).collect();
        let mut seen = FxHashSet::default();
        for source in std::iter::once(doc.content.as_str()).chain(chain.iter().map(|l| l.content.as_str())) {
            self.collect_includes(source, &mut seen, &mut dependencies);
        }

        Ok(Rendered {
            output: content,
            dependencies,
        })
    }

    /// Layouts applied to `doc`, innermost first.
    pub fn layout_chain(&self, doc: &Document) -> Result<Vec<&'a Document>, RenderError> {
        let mut chain = Vec::new();
        let mut names: Vec<String> = Vec::new();
        let mut next = doc.layout().map(str::to_owned);

        while let Some(name) = next {
            let key = layout_key(&name);
            if names.contains(&key) {
                names.push(key);
                return Err(RenderError::LayoutCycle(names.join(" -> ")));
            }
            let Some(layout) = self.find_layout(&name)? else {
                log!("warn"; "{}: layout `{}` not found", doc.relative_path, name);
                break;
            };
            names.push(key);
            chain.push(layout);
            next = layout.layout().map(str::to_owned);
        }
        Ok(chain)
    }

    /// The loaded layout that `name` resolves to, site before theme.
    fn find_layout(&self, name: &str) -> Result<Option<&'a Document>, RenderError> {
        let Some(path) = self.site.theme.resolve_layout(name)? else {
            return Ok(None);
        };
        Ok(self.site.layouts.values().find(|layout| layout.path == path))
    }

    fn convert(&self, doc: &Document, body: &str) -> String {
        let converter = self.converter_for(&doc.extension);
        debug!("render"; "{}: {} converter", doc.relative_path, converter.name());
        converter.convert(body)
    }

    fn converter_for(&self, ext: &str) -> &dyn Converter {
        self.converters
            .iter()
            .find(|c| c.matches(ext))
            .map_or(&IdentityConverter as &dyn Converter, |c| c.as_ref())
    }

    /// Resolve `{% include %}` targets in `source`, following nested includes.
    fn collect_includes(&self, source: &str, seen: &mut FxHashSet<String>, out: &mut Vec<PathBuf>) {
        for caps in RE_INCLUDE.captures_iter(source) {
            let name = caps[1].to_owned();
            if !seen.insert(name.clone()) {
                continue;
            }
            let Ok(Some(path)) = self.site.theme.resolve_include(&name) else {
                continue;
            };
            if let Ok(nested) = fs::read_to_string(&path) {
                out.push(path);
                self.collect_includes(&nested, seen, out);
            }
        }
    }
}

/// `default.html` and `default` name the same layout.
fn layout_key(name: &str) -> String {
    name.strip_suffix(".html")
        .or_else(|| name.strip_suffix(".htm"))
        .unwrap_or(name)
        .to_owned()
}
