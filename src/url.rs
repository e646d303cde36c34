//! Permalink expansion and URL → output path mapping.
//!
//! URL generation and output-path mapping are separate steps: a URL such as
//! `/blog/hello/` or `/about` still has to land in a real file
//! (`blog/hello/index.html`, `about/index.html`).
//!
//! # Output path safety
//!
//! Traversal segments in a permalink are *neutralized*, not rejected: the
//! URL is collapsed so `..` never climbs above the destination root, the
//! document is still written, and the final joined path is checked again
//! with [`is_within`] before any write.

use crate::{
    config::{Collections, PermalinkStyle, SiteConfig, SlugMode},
    content::{Document, DocumentKind},
    error::BuildError,
    utils::{
        path::{collapse_url, is_within},
        slug::slugify,
    },
};
use chrono::{Datelike, Timelike};
use std::path::{Path, PathBuf};

/// Default permalink for collection documents.
pub const COLLECTION_PERMALINK: &str = "/:collection/:path:output_ext";

/// Computes document URLs from permalink patterns and source paths.
#[derive(Debug, Clone)]
pub struct UrlGenerator {
    style: PermalinkStyle,
    slug_mode: SlugMode,
    markdown_ext: Vec<String>,
    collections: Collections,
}

impl UrlGenerator {
    pub fn new(config: &SiteConfig) -> Self {
        Self {
            style: config.build.permalink.clone(),
            slug_mode: config.build.slug.clone(),
            markdown_ext: config.build.markdown_ext.clone(),
            collections: config.collections.clone(),
        }
    }

    /// Canonical URL of `doc`, always starting with `/`.
    pub fn generate_url(&self, doc: &Document) -> String {
        if let Some(permalink) = &doc.front_matter.permalink {
            return self.expand(permalink, doc);
        }

        match doc.kind {
            DocumentKind::Post => self.expand(self.style.pattern(), doc),
            DocumentKind::Collection => {
                let pattern = doc
                    .collection
                    .as_deref()
                    .and_then(|name| self.collections.get(name))
                    .and_then(|c| c.permalink.as_deref())
                    .unwrap_or(COLLECTION_PERMALINK);
                self.expand(pattern, doc)
            }
            DocumentKind::Page | DocumentKind::Layout | DocumentKind::Include => {
                self.page_url(doc)
            }
        }
    }

    /// Destination-relative file path for `doc`.
    ///
    /// Uses the assigned URL, or generates one if none was assigned yet. A
    /// final segment carrying the document's own output extension is kept
    /// as a file, so `sitemap.xsl` or `calendar.ics` pages stay files.
    pub fn generate_output_path(&self, doc: &Document) -> PathBuf {
        let generated;
        let url = if doc.url.is_empty() {
            generated = self.generate_url(doc);
            &generated
        } else {
            &doc.url
        };
        let own_ext = self.output_ext(&doc.extension);
        let own_ext = own_ext.trim_start_matches('.');
        if own_ext.is_empty() || is_file_extension(own_ext) {
            return url_to_output_path(url);
        }
        output_path_with(url, |segment| {
            extension_of(segment)
                .is_some_and(|ext| ext.eq_ignore_ascii_case(own_ext) || is_file_extension(ext))
        })
    }

    /// Absolute output file for `doc` under `destination`.
    ///
    /// Fails with [`BuildError::UnsafeOutputPath`] if the joined path is not
    /// inside `destination`.
    pub fn output_file(&self, destination: &Path, doc: &Document) -> Result<PathBuf, BuildError> {
        let path = destination.join(self.generate_output_path(doc));
        ensure_within(destination, path, &doc.url)
    }

    /// Output extension (with dot) for a source extension.
    pub fn output_ext(&self, ext: &str) -> String {
        if self.markdown_ext.iter().any(|e| e.eq_ignore_ascii_case(ext)) {
            ".html".to_owned()
        } else if ext.is_empty() {
            String::new()
        } else {
            format!(".{ext}")
        }
    }

    /// Relative source path with the output extension; `index` collapses
    /// to its directory.
    fn page_url(&self, doc: &Document) -> String {
        let relative = doc.relative_path.as_str();
        let dir = relative.rsplit_once('/').map_or("", |(dir, _)| dir);
        let output_ext = self.output_ext(&doc.extension);

        if doc.basename == "index" && (output_ext == ".html" || output_ext == ".htm") {
            return if dir.is_empty() {
                "/".to_owned()
            } else {
                format!("/{dir}/")
            };
        }

        if dir.is_empty() {
            format!("/{}{output_ext}", doc.basename)
        } else {
            format!("/{dir}/{}{output_ext}", doc.basename)
        }
    }

    /// Replace `:token` placeholders and normalize slashes.
    ///
    /// Unknown tokens are kept literally.
    pub fn expand(&self, pattern: &str, doc: &Document) -> String {
        let mut out = String::with_capacity(pattern.len() + 16);
        let mut rest = pattern;

        while let Some(pos) = rest.find(':') {
            out.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];
            let len = after
                .find(|c: char| !(c.is_ascii_lowercase() || c == '_'))
                .unwrap_or(after.len());
            let token = &after[..len];

            match self.token_value(token, doc) {
                Some(value) => out.push_str(&value),
                None => {
                    out.push(':');
                    out.push_str(token);
                }
            }
            rest = &after[len..];
        }
        out.push_str(rest);

        normalize_slashes(&out)
    }

    fn token_value(&self, token: &str, doc: &Document) -> Option<String> {
        let date = &doc.date;
        let value = match token {
            "year" => date.format("%Y").to_string(),
            "month" => date.format("%m").to_string(),
            "i_month" => date.month().to_string(),
            "day" => date.format("%d").to_string(),
            "i_day" => date.day().to_string(),
            "short_year" => date.format("%y").to_string(),
            "hour" => format!("{:02}", date.hour()),
            "minute" => format!("{:02}", date.minute()),
            "second" => format!("{:02}", date.second()),
            "y_day" => date.format("%j").to_string(),
            "week" => format!("{:02}", date.iso_week().week()),
            "short_day" => date.format("%a").to_string(),
            "long_day" => date.format("%A").to_string(),
            "short_month" => date.format("%b").to_string(),
            "long_month" => date.format("%B").to_string(),
            "title" | "slug" => doc.slug.clone(),
            "categories" => doc
                .front_matter
                .categories
                .iter()
                .map(|c| slugify(c, &self.slug_mode))
                .filter(|c| !c.is_empty())
                .collect::<Vec<_>>()
                .join("/"),
            "collection" => doc.collection.clone().unwrap_or_default(),
            "path" => collection_relative_stem(doc),
            "name" | "basename" => doc.basename.clone(),
            "output_ext" => self.output_ext(&doc.extension),
            _ => return None,
        };
        Some(value)
    }
}

/// Source path without extension; collection documents drop their `_<name>/` prefix.
fn collection_relative_stem(doc: &Document) -> String {
    let relative = match &doc.collection {
        Some(name) => doc
            .relative_path
            .strip_prefix(&format!("_{name}/"))
            .unwrap_or(&doc.relative_path),
        None => &doc.relative_path,
    };
    let stem = |file: &'_ str| -> String {
        file.rsplit_once('.')
            .filter(|(s, _)| !s.is_empty())
            .map_or(file, |(s, _)| s)
            .to_owned()
    };
    match relative.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/{}", stem(file)),
        None => stem(relative),
    }
}

/// Collapse repeated slashes and guarantee a leading `/`.
fn normalize_slashes(url: &str) -> String {
    let mut out = String::with_capacity(url.len() + 1);
    out.push('/');
    for c in url.chars() {
        if c == '/' && out.ends_with('/') {
            continue;
        }
        out.push(c);
    }
    out
}

// ============================================================================
// Output paths
// ============================================================================

/// Final-segment extensions written as files rather than directories.
const FILE_EXTENSIONS: &[&str] = &[
    "html", "htm", "xhtml", "xml", "json", "txt", "css", "js", "rss", "atom", "webmanifest",
];

/// Map a URL to a destination-relative file path.
///
/// - `/` or `/blog/` → `index.html`, `blog/index.html`
/// - `/feed.xml`, `/a/b.html` → as-is
/// - `/about`, `/releases/v1.2` → `about/index.html`, `releases/v1.2/index.html`
///
/// Traversal segments are collapsed first, so the result never starts
/// with `..`.
pub fn url_to_output_path(url: &str) -> PathBuf {
    output_path_with(url, has_file_extension)
}

fn output_path_with(url: &str, is_file: impl Fn(&str) -> bool) -> PathBuf {
    let collapsed = collapse_url(url);
    let relative = collapsed.trim_start_matches('/');

    let file = if relative.is_empty() || relative.ends_with('/') {
        format!("{relative}index.html")
    } else {
        let last = relative.rsplit('/').next().unwrap_or(relative);
        if is_file(last) {
            relative.to_owned()
        } else {
            format!("{relative}/index.html")
        }
    };

    file.split('/').collect()
}

fn extension_of(segment: &str) -> Option<&str> {
    Path::new(segment).extension().and_then(|ext| ext.to_str())
}

fn is_file_extension(ext: &str) -> bool {
    FILE_EXTENSIONS.iter().any(|known| known.eq_ignore_ascii_case(ext))
}

fn has_file_extension(segment: &str) -> bool {
    extension_of(segment).is_some_and(is_file_extension)
}

/// Join a destination-relative path (a static file or generated file)
/// under `destination`, neutralizing traversal.
pub fn safe_join(destination: &Path, relative: &str) -> Result<PathBuf, BuildError> {
    let collapsed = collapse_url(relative);
    let trimmed = collapsed.trim_matches('/');
    if trimmed.is_empty() {
        return Err(BuildError::UnsafeOutputPath {
            url: relative.to_owned(),
        });
    }
    let path = destination.join(trimmed.split('/').collect::<PathBuf>());
    ensure_within(destination, path, relative)
}

fn ensure_within(destination: &Path, path: PathBuf, url: &str) -> Result<PathBuf, BuildError> {
    if is_within(destination, &path) && path != destination {
        Ok(path)
    } else {
        Err(BuildError::UnsafeOutputPath {
            url: url.to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        config: SiteConfig,
    }

    impl Fixture {
        fn new(toml: &str) -> Self {
            let dir = TempDir::new().unwrap();
            let mut config = SiteConfig::from_str(toml).unwrap();
            config.source = dir.path().to_path_buf();
            Self { dir, config }
        }

        fn doc(&self, rel: &str, content: &str, kind: DocumentKind) -> Document {
            let path = self.dir.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, content).unwrap();
            match kind {
                DocumentKind::Collection => {
                    let name = rel.split('/').next().unwrap().trim_start_matches('_');
                    Document::read_collection(&path, self.dir.path(), name, Some(&self.config))
                        .unwrap()
                }
                _ => Document::read(&path, self.dir.path(), kind, Some(&self.config)).unwrap(),
            }
        }

        fn urls(&self) -> UrlGenerator {
            UrlGenerator::new(&self.config)
        }
    }

    #[test]
    fn test_post_date_style() {
        let fx = Fixture::new("");
        let post = fx.doc("_posts/2024-01-15-hello.md", "---\ntitle: Hello\n---\n", DocumentKind::Post);
        assert_eq!(fx.urls().generate_url(&post), "/2024/01/15/hello.html");

        let post = fx.doc(
            "_posts/2024-03-05-release.md",
            "---\ncategories: [Rust, Web Dev]\n---\n",
            DocumentKind::Post,
        );
        assert_eq!(fx.urls().generate_url(&post), "/Rust/Web-Dev/2024/03/05/release.html");
    }

    #[test]
    fn test_post_styles() {
        let content = "---\n---\n";
        let cases = [
            ("pretty", "/2024/01/15/hello/"),
            ("ordinal", "/2024/015/hello.html"),
            ("weekdate", "/2024/W03/Mon/hello.html"),
            ("none", "/hello.html"),
            ("/blog/:year/:i_month/:i_day/:title", "/blog/2024/1/15/hello"),
        ];
        for (style, expected) in cases {
            let fx = Fixture::new(&format!("[build]\npermalink = \"{style}\""));
            let post = fx.doc("_posts/2024-01-15-hello.md", content, DocumentKind::Post);
            assert_eq!(fx.urls().generate_url(&post), expected, "style {style}");
        }
    }

    #[test]
    fn test_time_and_month_tokens() {
        let fx = Fixture::new(
            "[build]\npermalink = \"/:short_year/:short_month/:long_month/:hour-:minute-:second/:slug\"",
        );
        let post = fx.doc(
            "_posts/2024-01-15-hello.md",
            "---\ndate: 2024-02-03 04:05:06\n---\n",
            DocumentKind::Post,
        );
        assert_eq!(
            fx.urls().generate_url(&post),
            "/24/Feb/February/04-05-06/hello"
        );
    }

    #[test]
    fn test_unknown_tokens_kept_and_slashes_collapsed() {
        let fx = Fixture::new("[build]\npermalink = \"blog//:nope/:title/\"");
        let post = fx.doc("_posts/2024-01-15-hello.md", "---\n---\n", DocumentKind::Post);
        assert_eq!(fx.urls().generate_url(&post), "/blog/:nope/hello/");
    }

    #[test]
    fn test_page_urls() {
        let fx = Fixture::new("");
        let urls = fx.urls();

        let page = fx.doc("about.md", "---\n---\n", DocumentKind::Page);
        assert_eq!(urls.generate_url(&page), "/about.html");

        let index = fx.doc("index.html", "---\n---\n", DocumentKind::Page);
        assert_eq!(urls.generate_url(&index), "/");

        let nested = fx.doc("docs/index.markdown", "---\n---\n", DocumentKind::Page);
        assert_eq!(urls.generate_url(&nested), "/docs/");

        let feed = fx.doc("feed.xml", "---\n---\n", DocumentKind::Page);
        assert_eq!(urls.generate_url(&feed), "/feed.xml");

        let explicit = fx.doc("about.md", "---\npermalink: /custom/about-us/\n---\n", DocumentKind::Page);
        assert_eq!(urls.generate_url(&explicit), "/custom/about-us/");
        assert_eq!(
            urls.generate_output_path(&explicit),
            PathBuf::from("custom/about-us/index.html")
        );
    }

    #[test]
    fn test_collection_urls() {
        let fx = Fixture::new(
            r#"
            [collections.recipes]
            output = true
            [collections.guides]
            output = true
            permalink = "/learn/:title/"
        "#,
        );
        let urls = fx.urls();

        let cake = fx.doc("_recipes/cake.md", "---\n---\n", DocumentKind::Collection);
        assert_eq!(urls.generate_url(&cake), "/recipes/cake.html");
        assert_eq!(urls.generate_output_path(&cake), PathBuf::from("recipes/cake.html"));

        let nested = fx.doc("_recipes/desserts/pie.md", "---\n---\n", DocumentKind::Collection);
        assert_eq!(urls.generate_url(&nested), "/recipes/desserts/pie.html");

        let guide = fx.doc("_guides/setup.md", "---\n---\n", DocumentKind::Collection);
        assert_eq!(urls.generate_url(&guide), "/learn/setup/");
    }

    #[test]
    fn test_url_to_output_path() {
        assert_eq!(url_to_output_path("/"), PathBuf::from("index.html"));
        assert_eq!(url_to_output_path(""), PathBuf::from("index.html"));
        assert_eq!(url_to_output_path("/blog/"), PathBuf::from("blog/index.html"));
        assert_eq!(url_to_output_path("/a/b.html"), PathBuf::from("a/b.html"));
        assert_eq!(url_to_output_path("/feed.xml"), PathBuf::from("feed.xml"));
        assert_eq!(url_to_output_path("/about"), PathBuf::from("about/index.html"));
        assert_eq!(url_to_output_path("/robots.txt"), PathBuf::from("robots.txt"));
        assert_eq!(url_to_output_path("/Page.HTML"), PathBuf::from("Page.HTML"));
        assert_eq!(
            url_to_output_path("/releases/v1.2"),
            PathBuf::from("releases/v1.2/index.html")
        );
        assert_eq!(
            url_to_output_path("/photos/img.jpeg"),
            PathBuf::from("photos/img.jpeg/index.html")
        );
        assert_eq!(
            url_to_output_path("/../../etc/passwd"),
            PathBuf::from("etc/passwd/index.html")
        );
    }

    #[test]
    fn test_traversal_permalink_stays_inside_destination() {
        let fx = Fixture::new("");
        let dest = fx.dir.path().join("_site");
        let mut doc = fx.doc(
            "evil.md",
            "---\npermalink: /../../../../etc/cron.d/x.html\n---\n",
            DocumentKind::Page,
        );
        let urls = fx.urls();
        doc.url = urls.generate_url(&doc);
        let file = urls.output_file(&dest, &doc).unwrap();

        assert!(file.starts_with(&dest));
        assert_eq!(file, dest.join("etc/cron.d/x.html"));
    }

    #[test]
    fn test_output_file_never_escapes() {
        let dest = Path::new("/srv/site/_site");
        let inputs = [
            "",
            "/",
            "..",
            "../",
            "/..",
            "/../../..",
            "/a/../../../b",
            "..\\..\\windows\\win.ini",
            "/./././",
            "//double//slash//",
            "/a/b/c/../../../../../../../../x.html",
            "/%2e%2e/x",
        ];
        for input in inputs {
            let file = ensure_within(dest, dest.join(url_to_output_path(input)), input).unwrap();
            assert!(file.starts_with(dest), "{input} -> {}", file.display());
            assert!(
                !file.components().any(|c| matches!(c, std::path::Component::ParentDir)),
                "{input}"
            );
        }
    }

    #[test]
    fn test_safe_join() {
        let dest = Path::new("/srv/_site");
        assert_eq!(safe_join(dest, "img/a.png").unwrap(), dest.join("img/a.png"));
        assert_eq!(safe_join(dest, "/LICENSE").unwrap(), dest.join("LICENSE"));
        assert_eq!(safe_join(dest, "../../x").unwrap(), dest.join("x"));
        assert!(matches!(
            safe_join(dest, "../.."),
            Err(BuildError::UnsafeOutputPath { .. })
        ));
    }

    #[test]
    fn test_output_path_keeps_own_extension() {
        let fx = Fixture::new("");
        let urls = fx.urls();

        let xsl = fx.doc("sitemap.xsl", "---\n---\n", DocumentKind::Page);
        assert_eq!(urls.generate_output_path(&xsl), PathBuf::from("sitemap.xsl"));

        let release = fx.doc("v12.md", "---\npermalink: /releases/v1.2\n---\n", DocumentKind::Page);
        assert_eq!(
            urls.generate_output_path(&release),
            PathBuf::from("releases/v1.2/index.html")
        );
    }

    #[test]
    fn test_output_file_without_assigned_url() {
        let fx = Fixture::new("");
        let dest = fx.dir.path().join("_site");
        let doc = fx.doc("docs/guide.md", "---\n---\n", DocumentKind::Page);
        assert!(doc.url.is_empty());
        assert_eq!(fx.urls().output_file(&dest, &doc).unwrap(), dest.join("docs/guide.html"));
    }

    #[test]
    fn test_output_ext() {
        let fx = Fixture::new("");
        let urls = fx.urls();
        assert_eq!(urls.output_ext("md"), ".html");
        assert_eq!(urls.output_ext("MARKDOWN"), ".html");
        assert_eq!(urls.output_ext("html"), ".html");
        assert_eq!(urls.output_ext("xml"), ".xml");
        assert_eq!(urls.output_ext(""), "");
    }
}
