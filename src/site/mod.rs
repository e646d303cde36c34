//! The in-memory site: every document, static file and data value of one build.
//!
//! # Read phases
//!
//! ```text
//! read()
//!     │
//!     ├── phase 1 (concurrent)
//!     │       ├── layouts   (theme dir, then site dir: site wins)
//!     │       ├── includes  (same precedence)
//!     │       └── data      (file-level site-over-theme)
//!     │
//!     └── phase 2 (concurrent, after phase 1)
//!             ├── posts + drafts
//!             ├── collections
//!             └── pages + static files (one walk of the source root)
//! ```
//!
//! Files are parsed in fixed-size batches, each batch in parallel. A file
//! that fails to parse is logged and skipped; its batch siblings are not
//! affected.

mod data;
pub mod filter;

pub use filter::EntryFilter;

use crate::{
    config::{CollectionConfig, SiteConfig},
    content::{Document, DocumentKind, StaticFile, has_front_matter},
    debug,
    error::{BuildError, ContentError},
    log,
    theme::ThemeManager,
    utils::{date, path::to_slash},
};
use chrono::NaiveDateTime;
use rayon::prelude::*;
use rustc_hash::FxHashSet;
use serde_json::Value;
use std::{
    cmp::Ordering,
    collections::BTreeMap,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

/// Documents parsed concurrently per batch.
pub const DOCUMENT_BATCH: usize = 32;
/// Static files stat'ed concurrently per batch.
pub const STATIC_BATCH: usize = 128;

/// A configured collection and its documents.
#[derive(Debug, Clone)]
pub struct Collection {
    pub config: CollectionConfig,
    pub docs: Vec<Document>,
}

impl Collection {
    pub fn name(&self) -> &str {
        &self.config.name
    }
}

/// Aggregate root for one build.
#[derive(Debug)]
pub struct Site {
    pub config: SiteConfig,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub pages: Vec<Document>,
    /// Sorted by date, then relative path.
    pub posts: Vec<Document>,
    /// In declaration order.
    pub collections: Vec<Collection>,
    /// Layout name (`default`, `blog/post`) → document.
    pub layouts: BTreeMap<String, Document>,
    /// Include path (`nav.html`) → document.
    pub includes: BTreeMap<String, Document>,
    pub data: Value,
    pub static_files: Vec<StaticFile>,
    pub theme: ThemeManager,
    /// Time the read started, exposed as `site.time`.
    pub time: NaiveDateTime,
}

impl Site {
    pub fn new(config: SiteConfig) -> Result<Self, BuildError> {
        let theme = ThemeManager::new(&config)?;
        Ok(Self {
            source: config.source.clone(),
            destination: config.destination().to_path_buf(),
            config,
            pages: Vec::new(),
            posts: Vec::new(),
            collections: Vec::new(),
            layouts: BTreeMap::new(),
            includes: BTreeMap::new(),
            data: Value::Object(Default::default()),
            static_files: Vec::new(),
            theme,
            time: date::now(),
        })
    }

    /// Walk the source tree and populate every content list.
    pub fn read(&mut self) -> Result<(), BuildError> {
        if !self.source.is_dir() {
            return Err(BuildError::fs(
                "read source directory",
                &self.source,
                std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            ));
        }
        self.time = date::now();

        let ((layouts, includes), data) = rayon::join(
            || rayon::join(|| self.read_layouts(), || self.read_includes()),
            || data::load_data(&self.theme),
        );

        let ((posts, collections), (pages, static_files)) = rayon::join(
            || rayon::join(|| self.read_posts(), || self.read_collections()),
            || self.read_pages_and_static(),
        );

        self.layouts = layouts;
        self.includes = includes;
        self.data = data;
        self.posts = posts;
        self.collections = collections;
        self.pages = pages;
        self.static_files = static_files;

        debug!(
            "read";
            "{} pages, {} posts, {} layouts, {} includes, {} static files",
            self.pages.len(),
            self.posts.len(),
            self.layouts.len(),
            self.includes.len(),
            self.static_files.len()
        );
        Ok(())
    }

    // ========================================================================
    // Phase 1
    // ========================================================================

    fn read_layouts(&self) -> BTreeMap<String, Document> {
        self.read_named(&self.theme.get_layout_directories(), DocumentKind::Layout, true)
    }

    fn read_includes(&self) -> BTreeMap<String, Document> {
        self.read_named(&self.theme.get_include_directories(), DocumentKind::Include, false)
    }

    /// Read every file under `dirs` keyed by its name inside the directory.
    ///
    /// `dirs` is site-first; reading in reverse lets the site entry
    /// overwrite the theme entry with the same name.
    fn read_named(
        &self,
        dirs: &[PathBuf],
        kind: DocumentKind,
        strip_extension: bool,
    ) -> BTreeMap<String, Document> {
        let mut named = BTreeMap::new();
        for dir in dirs.iter().rev() {
            let root = self.document_root(dir);
            let paths = walk_files(dir);
            let docs = read_batched(&paths, DOCUMENT_BATCH, |path| {
                Document::read(path, &root, kind, None)
            });
            for doc in docs {
                let Ok(relative) = doc.path.strip_prefix(dir) else {
                    continue;
                };
                let relative = if strip_extension {
                    relative.with_extension("")
                } else {
                    relative.to_path_buf()
                };
                named.insert(to_slash(&relative), doc);
            }
        }
        named
    }

    /// Site files are relative to the source root, theme files to the theme root.
    fn document_root(&self, dir: &Path) -> PathBuf {
        match self.theme.theme() {
            Some(theme) if dir.starts_with(&theme.root) => theme.root.clone(),
            _ => self.source.clone(),
        }
    }

    // ========================================================================
    // Phase 2
    // ========================================================================

    fn read_posts(&self) -> Vec<Document> {
        let config = &self.config;
        let posts_dir = config.source_dir(&config.build.posts_dir);
        let drafts_dir = config.source_dir(&config.build.drafts_dir);

        let post_paths = self.template_files(&posts_dir);
        let mut posts = read_batched(&post_paths, DOCUMENT_BATCH, |path| {
            Document::read(path, &self.source, DocumentKind::Post, Some(config))
        });

        if config.build.drafts {
            let draft_paths = self.template_files(&drafts_dir);
            let drafts = read_batched(&draft_paths, DOCUMENT_BATCH, |path| {
                Document::read(path, &self.source, DocumentKind::Post, Some(config))
                    .map(Document::into_draft)
            });
            posts.extend(drafts);
        }

        posts.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.relative_path.cmp(&b.relative_path)));
        posts
    }

    fn read_collections(&self) -> Vec<Collection> {
        self.config
            .collections
            .iter()
            .map(|collection| {
                let dir = self.config.source_dir(&collection.directory());
                let paths: Vec<_> = walk_files(&dir)
                    .into_iter()
                    .filter(|p| has_front_matter(p).unwrap_or(false))
                    .collect();
                let mut docs = read_batched(&paths, DOCUMENT_BATCH, |path| {
                    Document::read_collection(path, &self.source, &collection.name, Some(&self.config))
                });
                sort_collection(&mut docs, collection.sort_by.as_deref());
                Collection {
                    config: collection.clone(),
                    docs,
                }
            })
            .collect()
    }

    fn read_pages_and_static(&self) -> (Vec<Document>, Vec<StaticFile>) {
        let filter = EntryFilter::new(&self.config);
        let source = &self.source;

        let files: Vec<PathBuf> = WalkDir::new(source)
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0
                    || e
                        .path()
                        .strip_prefix(source)
                        .is_ok_and(|rel| filter.allows(e.path(), &to_slash(rel)))
            })
            .filter_map(|e| match e {
                Ok(entry) => Some(entry),
                Err(err) => {
                    log!("warn"; "{err}");
                    None
                }
            })
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect();

        let (page_paths, static_paths): (Vec<_>, Vec<_>) = files
            .into_par_iter()
            .partition(|path| has_front_matter(path).unwrap_or(false));

        rayon::join(
            || {
                let mut pages = read_batched(&page_paths, DOCUMENT_BATCH, |path| {
                    Document::read(path, source, DocumentKind::Page, Some(&self.config))
                });
                pages.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
                pages
            },
            || {
                let mut files =
                    read_batched(&static_paths, STATIC_BATCH, |path| StaticFile::new(path, source));
                files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
                files
            },
        )
    }

    /// Files under `dir` with a Markdown or HTML extension, hidden entries skipped.
    fn template_files(&self, dir: &Path) -> Vec<PathBuf> {
        walk_files(dir)
            .into_iter()
            .filter(|path| {
                path.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|ext| {
                        self.config.build.is_markdown_ext(ext)
                            || ext.eq_ignore_ascii_case("html")
                            || ext.eq_ignore_ascii_case("htm")
                    })
            })
            .collect()
    }

    // ========================================================================
    // Queries
    // ========================================================================

    #[cfg(test)]
    pub fn collection(&self, name: &str) -> Option<&Collection> {
        self.collections.iter().find(|c| c.name() == name)
    }

    /// Relative paths of the site's own static files.
    pub fn static_paths(&self) -> FxHashSet<String> {
        self.static_files
            .iter()
            .map(|f| f.relative_path.clone())
            .collect()
    }

    /// Cache key for a file: source-relative when inside the source,
    /// absolute otherwise (theme files).
    pub fn dependency_key(&self, path: &Path) -> String {
        match path.strip_prefix(&self.source) {
            Ok(relative) => to_slash(relative),
            Err(_) => path.to_string_lossy().replace('\\', "/"),
        }
    }

    /// Whether `post` passes the published/future policy.
    pub fn is_post_visible(&self, post: &Document) -> bool {
        let build = &self.config.build;
        (post.is_published() || build.drafts) && (build.future || post.date <= self.time)
    }

    /// Posts that pass the published/future policy, oldest first.
    pub fn visible_posts(&self) -> impl DoubleEndedIterator<Item = &Document> {
        self.posts.iter().filter(|post| self.is_post_visible(post))
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Non-hidden files below `dir`, sorted; empty when `dir` does not exist.
fn walk_files(dir: &Path) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !filter::is_hidden(&e.file_name().to_string_lossy()))
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// Run `read` over `paths` in batches of `batch`, each batch in parallel.
///
/// Failed reads are logged and dropped; input order is preserved.
pub fn read_batched<T, F>(paths: &[PathBuf], batch: usize, read: F) -> Vec<T>
where
    T: Send,
    F: Fn(&Path) -> Result<T, ContentError> + Sync,
{
    let mut out = Vec::with_capacity(paths.len());
    for chunk in paths.chunks(batch.max(1)) {
        let results: Vec<_> = chunk.par_iter().map(|path| read(path)).collect();
        for result in results {
            match result {
                Ok(item) => out.push(item),
                Err(err) => log!("warn"; "skipping: {:#}", anyhow::Error::new(err)),
            }
        }
    }
    out
}

/// Order by the `sort_by` front-matter key (missing values last), then path.
fn sort_collection(docs: &mut [Document], sort_by: Option<&str>) {
    docs.sort_by(|a, b| {
        let by_key = match sort_by {
            Some(key) => compare_values(a.front_matter.get(key), b.front_matter.get(key)),
            None => Ordering::Equal,
        };
        by_key.then_with(|| a.relative_path.cmp(&b.relative_path))
    });
}

fn compare_values(a: Option<Value>, b: Option<Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(&y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn site(dir: &TempDir, toml: &str) -> Site {
        write(dir.path(), "_config.toml", toml);
        let config = SiteConfig::load(dir.path(), Path::new("_config.toml")).unwrap();
        let mut site = Site::new(config).unwrap();
        site.read().unwrap();
        site
    }

    #[test]
    fn test_classifies_source_tree() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "index.md", "---\ntitle: Home\n---\nhi");
        write(dir.path(), "about/index.html", "---\n---\n<p>about</p>");
        write(dir.path(), "css/site.css", "body {}");
        write(dir.path(), "notes.txt", "plain text, no front matter");
        write(dir.path(), "_layouts/default.html", "{{ content }}");
        write(dir.path(), "_includes/nav.html", "<nav/>");
        write(dir.path(), "_posts/2024-01-15-hello.md", "---\ntitle: Hello\n---\n");
        write(dir.path(), "_data/authors.yml", "sam: {name: Sam}");
        write(dir.path(), ".env", "SECRET=1");
        write(dir.path(), "_site/stale.html", "old");
        write(dir.path(), "node_modules/x/index.js", "x");

        let site = site(&dir, "");

        let pages: Vec<_> = site.pages.iter().map(|p| p.relative_path.as_str()).collect();
        assert_eq!(pages, vec!["about/index.html", "index.md"]);

        let statics: Vec<_> = site.static_files.iter().map(|f| f.relative_path.as_str()).collect();
        assert_eq!(statics, vec!["css/site.css", "notes.txt"]);

        assert_eq!(site.posts.len(), 1);
        assert_eq!(site.posts[0].slug, "hello");
        assert!(site.layouts.contains_key("default"));
        assert!(site.includes.contains_key("nav.html"));
        assert_eq!(site.data["authors"]["sam"]["name"], "Sam");
    }

    #[test]
    fn test_bad_file_is_skipped_not_fatal() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "good.md", "---\ntitle: ok\n---\n");
        write(dir.path(), "bad.md", "---\ntitle: [broken\n---\n");
        write(dir.path(), "_posts/2024-01-01-bad.md", "---\ndate: never\n---\n");

        let site = site(&dir, "");
        assert_eq!(site.pages.len(), 1);
        assert_eq!(site.pages[0].relative_path, "good.md");
        assert!(site.posts.is_empty());
    }

    #[test]
    fn test_posts_sorted_by_date_and_drafts_opt_in() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "_posts/2024-03-01-c.md", "---\n---\n");
        write(dir.path(), "_posts/2023-01-01-a.md", "---\n---\n");
        write(dir.path(), "_posts/2024-01-01-b.md", "---\n---\n");
        write(dir.path(), "_posts/image.png", "png");
        write(dir.path(), "_drafts/idea.md", "---\ntitle: Idea\n---\n");

        let site1 = site(&dir, "");
        let slugs: Vec<_> = site1.posts.iter().map(|p| p.slug.as_str()).collect();
        assert_eq!(slugs, vec!["a", "b", "c"]);

        let site2 = site(&dir, "[build]\ndrafts = true");
        assert_eq!(site2.posts.len(), 4);
        assert!(site2.posts.iter().any(|p| p.is_draft && p.slug == "idea"));
    }

    #[test]
    fn test_visible_posts_policy() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "_posts/2020-01-01-old.md", "---\n---\n");
        write(dir.path(), "_posts/2999-01-01-future.md", "---\n---\n");
        write(dir.path(), "_posts/2020-02-02-hidden.md", "---\npublished: false\n---\n");

        let site1 = site(&dir, "");
        let visible: Vec<_> = site1.visible_posts().map(|p| p.slug.as_str()).collect();
        assert_eq!(visible, vec!["old"]);

        let site2 = site(&dir, "[build]\nfuture = true\ndrafts = true");
        assert_eq!(site2.visible_posts().count(), 3);
    }

    #[test]
    fn test_collections_read_in_declared_order_and_sorted() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "_recipes/b.md", "---\norder: 1\n---\n");
        write(dir.path(), "_recipes/a.md", "---\norder: 2\n---\n");
        write(dir.path(), "_recipes/c.md", "---\n---\n");
        write(dir.path(), "_recipes/photo.jpg", "jpg");
        write(dir.path(), "_authors/sam.md", "---\n---\n");

        let site = site(
            &dir,
            "[collections.recipes]\noutput = true\nsort_by = \"order\"\n[collections.authors]\n",
        );
        let names: Vec<_> = site.collections.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["recipes", "authors"]);

        let recipes = site.collection("recipes").unwrap();
        let order: Vec<_> = recipes.docs.iter().map(|d| d.basename.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "c"]);
        assert!(site.static_files.is_empty());
    }

    #[test]
    fn test_site_layouts_override_theme() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "_themes/t/_layouts/default.html", "theme");
        write(dir.path(), "_themes/t/_layouts/post.html", "theme post");
        write(dir.path(), "_layouts/default.html", "site");

        let site = site(&dir, "[theme]\nname = \"t\"");
        assert_eq!(site.layouts["default"].content, "site");
        assert_eq!(site.layouts["post"].content, "theme post");
        assert_eq!(site.layouts["post"].relative_path, "_layouts/post.html");
    }

    #[test]
    fn test_missing_source_is_fatal() {
        let dir = TempDir::new().unwrap();
        let mut config = SiteConfig::default();
        config.source = dir.path().join("missing");
        let mut site = Site::new(config).unwrap();
        assert!(matches!(site.read(), Err(BuildError::FileSystem { .. })));
    }

    #[test]
    fn test_dependency_key() {
        let dir = TempDir::new().unwrap();
        let site = site(&dir, "");
        assert_eq!(site.dependency_key(&site.source.join("_layouts/a.html")), "_layouts/a.html");
        assert!(site.dependency_key(Path::new("/elsewhere/x.html")).ends_with("elsewhere/x.html"));
    }

    #[test]
    fn test_read_batched_isolates_failures() {
        let paths: Vec<PathBuf> = (0..70).map(|i| PathBuf::from(format!("{i}"))).collect();
        let out = read_batched(&paths, 8, |path| {
            let n: usize = path.to_string_lossy().parse().unwrap();
            if n % 10 == 3 {
                Err(ContentError::OutsideRoot {
                    path: path.to_path_buf(),
                })
            } else {
                Ok(n)
            }
        });
        assert_eq!(out.len(), 63);
        assert!(out.windows(2).all(|w| w[0] < w[1]));
    }
}
