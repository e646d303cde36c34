//! Sitemap generation.
//!
//! Lists every rendered HTML document for search engine indexing.
//!
//! # Sitemap Format
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
//!   <url>
//!     <loc>https://example.com/</loc>
//!     <lastmod>2025-01-01</lastmod>
//!   </url>
//! </urlset>
//! ```
//!
//! Documents with `sitemap: false` in front matter are left out.

use super::{GeneratedFile, Generator, GeneratorOutput};
use crate::{content::Document, render::filters::xml_escape, site::Site};
use anyhow::Result;
use serde_json::Value;

/// XML namespace for sitemap
const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

/// Output file name.
pub const SITEMAP_FILE: &str = "sitemap.xml";

/// Writes `sitemap.xml`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SitemapGenerator;

impl Generator for SitemapGenerator {
    fn name(&self) -> &str {
        "sitemap"
    }

    fn generate(&self, site: &Site) -> Result<GeneratorOutput> {
        let sitemap = Sitemap::from_site(site);
        Ok(GeneratorOutput {
            files: vec![GeneratedFile::new(SITEMAP_FILE, sitemap.into_xml())],
            documents: Vec::new(),
        })
    }
}

// ============================================================================
// Sitemap Implementation
// ============================================================================

struct Sitemap {
    urls: Vec<UrlEntry>,
}

struct UrlEntry {
    loc: String,
    /// `YYYY-MM-DD`
    lastmod: String,
}

impl Sitemap {
    fn from_site(site: &Site) -> Self {
        let base = site.config.site_url();
        let collections = site
            .collections
            .iter()
            .filter(|c| c.config.output)
            .flat_map(|c| c.docs.iter());

        let mut urls: Vec<UrlEntry> = site
            .pages
            .iter()
            .chain(site.visible_posts())
            .chain(collections)
            .filter(|doc| is_listed(doc))
            .map(|doc| UrlEntry {
                loc: format!("{base}{}", doc.url),
                lastmod: doc.date.format("%Y-%m-%d").to_string(),
            })
            .collect();
        urls.sort_by(|a, b| a.loc.cmp(&b.loc));
        urls.dedup_by(|a, b| a.loc == b.loc);

        Self { urls }
    }

    fn into_xml(self) -> String {
        let mut xml = String::with_capacity(128 + self.urls.len() * 96);

        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        xml.push('\n');
        xml.push_str(&format!(r#"<urlset xmlns="{SITEMAP_NS}">"#));
        xml.push('\n');

        for entry in self.urls {
            xml.push_str("  <url>\n");
            xml.push_str(&format!("    <loc>{}</loc>\n", xml_escape(&entry.loc)));
            xml.push_str(&format!("    <lastmod>{}</lastmod>\n", entry.lastmod));
            xml.push_str("  </url>\n");
        }

        xml.push_str("</urlset>\n");
        xml
    }
}

/// Published HTML documents with a URL that did not opt out.
fn is_listed(doc: &Document) -> bool {
    let html = doc.url.ends_with('/') || doc.url.ends_with(".html") || doc.url.ends_with(".htm");
    !doc.url.is_empty()
        && html
        && doc.is_published()
        && doc.front_matter.extra.get("sitemap") != Some(&Value::Bool(false))
}
