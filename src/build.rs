//! Site building orchestration.
//!
//! # Pipeline
//!
//! ```text
//! Builder::build()
//!     │
//!     ├── read            Site::read (concurrent, batched)
//!     ├── clean           full builds only, keep_files survive
//!     ├── urls            pages, posts, output-enabled collections
//!     ├── select          incremental: only changed documents
//!     ├── render          sequential, one output file per document
//!     ├── static          parallel copy, up-to-date files skipped
//!     ├── plugins         generator files and documents
//!     └── cache           incremental: persist the ledger
//! ```
//!
//! A document that fails to render or write aborts the build. Static copies
//! and plugin output only warn.

use crate::{
    cache::CacheManager,
    config::SiteConfig,
    content::{Document, StaticFile},
    debug,
    error::BuildError,
    log,
    plugin::PluginRegistry,
    render::{EngineCache, EngineOptions, JinjaEngine, Renderer, TemplateEngine, filters::UrlBase},
    site::Site,
    url::{UrlGenerator, safe_join},
};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

// ============================================================================
// Report
// ============================================================================

/// Wall time per pipeline phase, in execution order.
#[derive(Debug, Clone, Default)]
pub struct Timings {
    phases: Vec<(&'static str, Duration)>,
}

impl Timings {
    /// Run `f`, recording its duration under `phase`.
    pub fn time<T>(&mut self, phase: &'static str, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let result = f();
        self.phases.push((phase, start.elapsed()));
        result
    }

    pub fn iter(&self) -> impl Iterator<Item = &(&'static str, Duration)> {
        self.phases.iter()
    }

    pub fn total(&self) -> Duration {
        self.phases.iter().map(|(_, d)| *d).sum()
    }

    fn log(&self) {
        for (phase, duration) in self.iter() {
            debug!("timing"; "{:<8} {:>8.2?}", phase, duration);
        }
        debug!("timing"; "{:<8} {:>8.2?}", "total", self.total());
    }
}

/// What one build did.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub rendered: usize,
    pub copied: usize,
    pub generated: usize,
    /// Incremental build found nothing to render.
    pub up_to_date: bool,
    pub elapsed: Duration,
    pub timings: Timings,
}

// ============================================================================
// Builder
// ============================================================================

/// Runs one build of one site. Owns its plugin registry and engine cache.
pub struct Builder {
    config: SiteConfig,
    registry: PluginRegistry,
    engines: EngineCache,
}

/// Where a rendered document lives inside the site.
#[derive(Debug, Clone, Copy)]
enum Slot {
    Page(usize),
    Post(usize),
    Collection(usize, usize),
}

struct Target<'a> {
    slot: Slot,
    doc: &'a Document,
    previous: Option<&'a Document>,
    next: Option<&'a Document>,
}

impl Builder {
    /// A builder with the default plugins for `config`.
    pub fn new(config: SiteConfig) -> Self {
        let registry = PluginRegistry::with_defaults(&config);
        Self::with_registry(config, registry)
    }

    pub fn with_registry(config: SiteConfig, registry: PluginRegistry) -> Self {
        Self {
            config,
            registry,
            engines: EngineCache::new(),
        }
    }

    /// Run the whole pipeline once.
    pub fn build(&mut self) -> Result<BuildReport, BuildError> {
        let start = Instant::now();
        let mut report = BuildReport::default();
        let mut timings = Timings::default();
        let incremental = self.config.build.incremental;

        let mut site = Site::new(self.config.clone())?;
        timings.time("read", || site.read())?;
        let destination = site.destination.clone();

        if !incremental && self.config.build.clean {
            timings.time("clean", || {
                clean_destination(&destination, &self.config.build.keep_files)
            })?;
        }
        fs::create_dir_all(&destination)
            .map_err(|e| BuildError::fs("create destination", &destination, e))?;

        let urls = UrlGenerator::new(&self.config);
        timings.time("urls", || assign_urls(&mut site, &urls));

        let mut cache = incremental.then(|| CacheManager::load(&self.config));
        let engine = self.engine(&site);

        let outputs = {
            let renderer = Renderer::new(&site, engine.clone(), self.registry.converters());
            let targets = render_targets(&site);
            warn_collisions(&urls, &targets);

            let targets = match &cache {
                Some(cache) => timings.time("select", || {
                    select_changed(&site, &renderer, cache, &urls, &destination, targets)
                }),
                None => targets,
            };
            if incremental && targets.is_empty() {
                log!("build"; "no changes");
                report.up_to_date = true;
            }

            timings.time("render", || {
                render_all(&site, &renderer, &urls, &destination, &targets, cache.as_mut())
            })?
        };
        report.rendered = outputs.len();
        for (slot, output) in outputs {
            if let Some(doc) = document_mut(&mut site, slot) {
                doc.output = Some(output);
            }
        }

        let theme_files = site.theme.theme_files_to_copy(&site.static_paths());
        report.copied = timings.time("static", || {
            copy_static(&site.static_files, &destination) + copy_static(&theme_files, &destination)
        });

        report.generated = timings.time("plugins", || {
            self.run_plugins(&site, engine, &urls, &destination)
        });

        if let Some(cache) = &mut cache {
            timings.time("cache", || cache.save());
        }

        report.elapsed = start.elapsed();
        report.timings = timings;
        report.timings.log();
        debug!(
            "build";
            "{} rendered, {} copied, {} generated",
            report.rendered,
            report.copied,
            report.generated
        );
        Ok(report)
    }

    /// Cached engine for this build's options, with plugin filters added.
    fn engine(&self, site: &Site) -> Arc<dyn TemplateEngine> {
        let options = EngineOptions {
            strict_variables: self.config.build.strict_variables,
        };
        self.engines.get_or_create(options, || {
            let mut engine =
                JinjaEngine::new(site.theme.clone(), UrlBase::from_config(&self.config), options);
            for (name, filter) in self.registry.filters() {
                engine.register_filter(name, filter.clone());
            }
            Arc::new(engine)
        })
    }

    /// Run generators and write what they return. Failures only warn.
    fn run_plugins(
        &self,
        site: &Site,
        engine: Arc<dyn TemplateEngine>,
        urls: &UrlGenerator,
        destination: &Path,
    ) -> usize {
        debug!("plugins"; "running [{}]", self.registry.generator_names().join(", "));
        let outputs = self.registry.run_generators(site);
        if outputs.is_empty() {
            return 0;
        }

        let renderer = Renderer::new(site, engine, self.registry.converters());
        let mut written = 0;
        for (name, output) in outputs {
            for file in output.files {
                match write_generated(destination, &file.path, &file.content) {
                    Ok(true) => written += 1,
                    Ok(false) => {}
                    Err(err) => log!("warn"; "{name}: {}: {:#}", file.path, anyhow::Error::new(err)),
                }
            }
            for mut doc in output.documents {
                doc.url = urls.generate_url(&doc);
                let result = renderer
                    .render(&doc, None, None)
                    .map_err(BuildError::from)
                    .and_then(|rendered| {
                        let path = urls.output_file(destination, &doc)?;
                        write_output(&path, rendered.output.as_bytes())
                    });
                match result {
                    Ok(()) => written += 1,
                    Err(err) => {
                        log!("warn"; "{name}: {}: {:#}", doc.relative_path, anyhow::Error::new(err))
                    }
                }
            }
        }
        if written > 0 {
            log!("plugins"; "{} files generated", written);
        }
        written
    }
}

// ============================================================================
// Pipeline steps
// ============================================================================

fn assign_urls(site: &mut Site, urls: &UrlGenerator) {
    for doc in site.pages.iter_mut().chain(site.posts.iter_mut()) {
        doc.url = urls.generate_url(doc);
    }
    for collection in site.collections.iter_mut().filter(|c| c.config.output) {
        for doc in &mut collection.docs {
            doc.url = urls.generate_url(doc);
        }
    }
}

/// Pages, then visible posts, then output-enabled collections.
fn render_targets(site: &Site) -> Vec<Target<'_>> {
    let drafts = site.config.build.drafts;
    let mut targets = Vec::new();

    for (i, doc) in site.pages.iter().enumerate() {
        if doc.is_published() || drafts {
            targets.push(Target {
                slot: Slot::Page(i),
                doc,
                previous: None,
                next: None,
            });
        }
    }

    let visible: Vec<usize> = (0..site.posts.len())
        .filter(|&i| site.is_post_visible(&site.posts[i]))
        .collect();
    for (k, &i) in visible.iter().enumerate() {
        targets.push(Target {
            slot: Slot::Post(i),
            doc: &site.posts[i],
            previous: k.checked_sub(1).map(|p| &site.posts[visible[p]]),
            next: visible.get(k + 1).map(|&n| &site.posts[n]),
        });
    }

    for (c, collection) in site.collections.iter().enumerate() {
        if !collection.config.output {
            continue;
        }
        for (i, doc) in collection.docs.iter().enumerate() {
            if doc.is_published() || drafts {
                targets.push(Target {
                    slot: Slot::Collection(c, i),
                    doc,
                    previous: None,
                    next: None,
                });
            }
        }
    }
    targets
}

/// Warn when two documents map to the same output file; the later one wins.
fn warn_collisions(urls: &UrlGenerator, targets: &[Target<'_>]) {
    let mut seen: FxHashMap<PathBuf, &str> = FxHashMap::default();
    for target in targets {
        let path = urls.generate_output_path(target.doc);
        if let Some(previous) = seen.insert(path.clone(), &target.doc.relative_path) {
            log!(
                "warn";
                "{} and {} both write {}",
                previous,
                target.doc.relative_path,
                path.display()
            );
        }
    }
}

/// Keep targets whose source, recorded dependencies, current layout chain
/// or output file changed.
fn select_changed<'a>(
    site: &Site,
    renderer: &Renderer<'_>,
    cache: &CacheManager,
    urls: &UrlGenerator,
    destination: &Path,
    targets: Vec<Target<'a>>,
) -> Vec<Target<'a>> {
    targets
        .into_iter()
        .filter(|target| {
            let doc = target.doc;
            let key = site.dependency_key(&doc.path);
            if cache.has_changed(&key) || cache.has_dependency_changes(&key) {
                return true;
            }
            let layouts_changed = match renderer.layout_chain(doc) {
                Ok(chain) => chain
                    .iter()
                    .any(|layout| cache.has_changed(&site.dependency_key(&layout.path))),
                Err(_) => true,
            };
            layouts_changed
                || urls.output_file(destination, doc).map_or(true, |path| !path.is_file())
        })
        .collect()
}

/// Render and write every target in order. The first failure aborts.
fn render_all(
    site: &Site,
    renderer: &Renderer<'_>,
    urls: &UrlGenerator,
    destination: &Path,
    targets: &[Target<'_>],
    mut cache: Option<&mut CacheManager>,
) -> Result<Vec<(Slot, String)>, BuildError> {
    let mut outputs = Vec::with_capacity(targets.len());
    for target in targets {
        let doc = target.doc;
        let in_doc = |err: BuildError| err.in_document(&doc.relative_path);

        let rendered = renderer
            .render(doc, target.previous, target.next)
            .map_err(|e| in_doc(e.into()))?;
        let path = urls.output_file(destination, doc).map_err(in_doc)?;
        write_output(&path, rendered.output.as_bytes()).map_err(in_doc)?;
        debug!("render"; "{} -> {}", doc.relative_path, doc.url);

        if let Some(cache) = cache.as_deref_mut() {
            let deps = rendered
                .dependencies
                .iter()
                .map(|p| site.dependency_key(p))
                .collect();
            cache.update_file(&site.dependency_key(&doc.path), deps);
        }
        outputs.push((target.slot, rendered.output));
    }
    if !targets.is_empty() {
        log!("render"; "{} documents", targets.len());
    }
    Ok(outputs)
}

fn document_mut(site: &mut Site, slot: Slot) -> Option<&mut Document> {
    match slot {
        Slot::Page(i) => site.pages.get_mut(i),
        Slot::Post(i) => site.posts.get_mut(i),
        Slot::Collection(c, i) => site.collections.get_mut(c)?.docs.get_mut(i),
    }
}

/// Copy files in parallel, skipping up-to-date ones. Returns the number copied.
fn copy_static(files: &[StaticFile], destination: &Path) -> usize {
    let copied = AtomicUsize::new(0);
    files.par_iter().for_each(|file| match copy_one(file, destination) {
        Ok(true) => {
            copied.fetch_add(1, Ordering::Relaxed);
        }
        Ok(false) => {}
        Err(err) => log!("warn"; "copy {}: {:#}", file.relative_path, anyhow::Error::new(err)),
    });
    copied.into_inner()
}

fn copy_one(file: &StaticFile, destination: &Path) -> Result<bool, BuildError> {
    let target = safe_join(destination, &file.relative_path)?;
    if let Ok(meta) = fs::metadata(&target)
        && meta.len() == file.size
        && meta.modified().is_ok_and(|m| m >= file.mtime)
    {
        return Ok(false);
    }
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| BuildError::fs("create directory", parent, e))?;
    }
    fs::copy(&file.path, &target).map_err(|e| BuildError::fs("copy", &file.path, e))?;
    Ok(true)
}

/// Write a generated file unless identical bytes are already there.
fn write_generated(destination: &Path, relative: &str, content: &[u8]) -> Result<bool, BuildError> {
    let path = safe_join(destination, relative)?;
    if fs::read(&path).is_ok_and(|existing| existing == content) {
        return Ok(false);
    }
    write_output(&path, content)?;
    Ok(true)
}

fn write_output(path: &Path, content: &[u8]) -> Result<(), BuildError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| BuildError::fs("create directory", parent, e))?;
    }
    fs::write(path, content).map_err(|e| BuildError::fs("write", path, e))
}

// ============================================================================
// Cleaning
// ============================================================================

/// Empty `destination`, preserving every `keep_files` path in place.
///
/// Kept paths are destination-relative; ancestors of a kept path are
/// descended into rather than removed.
pub fn clean_destination(destination: &Path, keep_files: &[String]) -> Result<(), BuildError> {
    if !destination.exists() {
        return Ok(());
    }
    let keep: Vec<&str> = keep_files
        .iter()
        .map(|k| k.trim_matches('/'))
        .filter(|k| !k.is_empty())
        .collect();
    remove_except(destination, "", &keep)
}

fn remove_except(dir: &Path, prefix: &str, keep: &[&str]) -> Result<(), BuildError> {
    let entries = fs::read_dir(dir).map_err(|e| BuildError::fs("clean", dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| BuildError::fs("clean", dir, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let relative = if prefix.is_empty() {
            name
        } else {
            format!("{prefix}/{name}")
        };
        if keep.contains(&relative.as_str()) {
            continue;
        }

        let path = entry.path();
        let is_dir = entry.file_type().is_ok_and(|t| t.is_dir());
        let ancestor = format!("{relative}/");
        if is_dir && keep.iter().any(|k| k.starts_with(&ancestor)) {
            remove_except(&path, &relative, keep)?;
            continue;
        }

        let removed = if is_dir {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        removed.map_err(|e| BuildError::fs("clean", &path, e))?;
    }
    Ok(())
}

/// `kiln clean`: empty the destination (keeping `keep_files`) and drop the
/// build cache.
pub fn clean_site(config: &SiteConfig) -> Result<(), BuildError> {
    clean_destination(config.destination(), &config.build.keep_files)?;
    let cache_dir = config.cache_dir();
    if cache_dir.exists() {
        fs::remove_dir_all(&cache_dir).map_err(|e| BuildError::fs("remove cache", &cache_dir, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        content::DocumentKind,
        plugin::{GeneratedFile, Generator, GeneratorOutput},
    };
    use filetime::{FileTime, set_file_mtime};
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn config(dir: &TempDir, toml: &str) -> SiteConfig {
        write(dir.path(), "_config.toml", toml);
        SiteConfig::load(dir.path(), Path::new("_config.toml")).unwrap()
    }

    fn build(dir: &TempDir, toml: &str) -> BuildReport {
        Builder::new(config(dir, toml)).build().unwrap()
    }

    fn site_dir(dir: &TempDir) -> PathBuf {
        dir.path().join("_site")
    }

    fn read(dir: &TempDir, rel: &str) -> String {
        fs::read_to_string(site_dir(dir).join(rel)).unwrap()
    }

    #[test]
    fn test_post_with_default_permalink() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "_posts/2024-01-15-hello.md", "---\ntitle: Hello\n---\nHello **world**");
        build(&dir, "");
        assert!(read(&dir, "2024/01/15/hello.html").contains("<strong>world</strong>"));
    }

    #[test]
    fn test_page_with_explicit_permalink() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "about.md", "---\npermalink: /custom/about-us/\n---\nAbout");
        build(&dir, "");
        assert!(read(&dir, "custom/about-us/index.html").contains("<p>About</p>"));
    }

    #[test]
    fn test_dotted_permalink_and_own_extension_outputs() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "release.md", "---\npermalink: /releases/v1.2\n---\nNotes");
        write(dir.path(), "sitemap.xsl", "---\n---\n<xsl:stylesheet/>");
        build(&dir, "");
        assert!(read(&dir, "releases/v1.2/index.html").contains("<p>Notes</p>"));
        assert_eq!(read(&dir, "sitemap.xsl"), "<xsl:stylesheet/>");
    }

    #[test]
    fn test_markdownify_filter_from_registry() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "index.html", "---\nblurb: \"*hi*\"\n---\n{{ page.blurb | markdownify }}");
        build(&dir, "");
        assert!(read(&dir, "index.html").contains("<em>hi</em>"));
    }

    #[test]
    fn test_collection_output_switch() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "_recipes/cake.md", "---\ntitle: Cake\n---\nYum");

        build(&dir, "[collections.recipes]\noutput = true");
        assert!(site_dir(&dir).join("recipes/cake.html").is_file());

        build(&dir, "[collections.recipes]\noutput = false");
        assert!(!site_dir(&dir).join("recipes/cake.html").exists());
    }

    #[test]
    fn test_layouts_and_static_files() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "_layouts/default.html", "<body>{{ content }}</body>");
        write(dir.path(), "index.html", "---\nlayout: default\n---\n<h1>{{ site.title }}</h1>");
        write(dir.path(), "css/site.css", "body {}");
        write(dir.path(), ".secret", "x");

        let report = build(&dir, "[site]\ntitle = \"Kiln\"");
        assert_eq!(read(&dir, "index.html"), "<body><h1>Kiln</h1></body>");
        assert_eq!(read(&dir, "css/site.css"), "body {}");
        assert!(!site_dir(&dir).join(".secret").exists());
        assert_eq!(report.rendered, 1);
        assert_eq!(report.copied, 1);
        assert!(report.timings.iter().any(|(phase, _)| *phase == "render"));
    }

    #[test]
    fn test_keep_files_survive_clean() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "index.md", "---\n---\nhome");
        write(dir.path(), "_site/.git/config", "[core]");
        write(dir.path(), "_site/old.html", "stale");

        build(&dir, "");
        assert!(site_dir(&dir).join(".git/config").is_file());
        assert!(!site_dir(&dir).join("old.html").exists());
        assert!(site_dir(&dir).join("index.html").is_file());
    }

    #[test]
    fn test_nested_keep_path() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "out/keep/me.txt", "1");
        write(dir.path(), "out/keep/not-me.txt", "2");
        write(dir.path(), "out/drop/x.txt", "3");

        clean_destination(&dir.path().join("out"), &["keep/me.txt/".to_owned()]).unwrap();
        assert!(dir.path().join("out/keep/me.txt").is_file());
        assert!(!dir.path().join("out/keep/not-me.txt").exists());
        assert!(!dir.path().join("out/drop").exists());
    }

    #[test]
    fn test_no_clean_keeps_stale_output() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "_site/old.html", "stale");
        build(&dir, "[build]\nclean = false");
        assert!(site_dir(&dir).join("old.html").exists());
    }

    #[test]
    fn test_incremental_second_build_renders_nothing() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "_layouts/default.html", "<main>{{ content }}</main>");
        write(dir.path(), "index.md", "---\nlayout: default\n---\nhome");
        write(dir.path(), "about.md", "---\n---\nabout");
        write(dir.path(), "_site/keep-me.html", "not cleaned in incremental mode");
        let config = config(&dir, "[build]\nincremental = true");
        let build = || Builder::new(config.clone()).build().unwrap();

        let first = build();
        assert_eq!(first.rendered, 2);
        assert!(site_dir(&dir).join("keep-me.html").exists());

        let output = site_dir(&dir).join("index.html");
        let pinned = FileTime::from_unix_time(1_000_000_000, 0);
        set_file_mtime(&output, pinned).unwrap();

        let second = build();
        assert_eq!(second.rendered, 0);
        assert!(second.up_to_date);
        let mtime = FileTime::from_last_modification_time(&fs::metadata(&output).unwrap());
        assert_eq!(mtime, pinned);

        let layout = dir.path().join("_layouts/default.html");
        fs::write(&layout, "<article>{{ content }}</article>").unwrap();
        set_file_mtime(&layout, FileTime::from_unix_time(4_000_000_000, 0)).unwrap();

        let third = build();
        assert_eq!(third.rendered, 1);
        assert!(read(&dir, "index.html").starts_with("<article>"));
    }

    #[test]
    fn test_incremental_rerenders_missing_output() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "about.md", "---\n---\nabout");
        let config = config(&dir, "[build]\nincremental = true");

        Builder::new(config.clone()).build().unwrap();
        fs::remove_file(site_dir(&dir).join("about.html")).unwrap();
        assert_eq!(Builder::new(config).build().unwrap().rendered, 1);
        assert!(site_dir(&dir).join("about.html").is_file());
    }

    #[test]
    fn test_post_filtering() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "_posts/2020-01-01-old.md", "---\n---\n");
        write(dir.path(), "_posts/2999-01-01-later.md", "---\n---\n");
        write(dir.path(), "_posts/2020-01-02-hidden.md", "---\npublished: false\n---\n");
        write(dir.path(), "_drafts/idea.md", "---\n---\n");

        build(&dir, "");
        assert!(site_dir(&dir).join("2020/01/01/old.html").exists());
        assert!(!site_dir(&dir).join("2999/01/01/later.html").exists());
        assert!(!site_dir(&dir).join("2020/01/02/hidden.html").exists());

        build(&dir, "[build]\nfuture = true\ndrafts = true");
        assert!(site_dir(&dir).join("2999/01/01/later.html").exists());
        assert!(site_dir(&dir).join("2020/01/02/hidden.html").exists());
        assert!(walk_contains(&site_dir(&dir), "idea.html"));
    }

    fn walk_contains(root: &Path, name: &str) -> bool {
        walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(Result::ok)
            .any(|e| e.file_name() == name)
    }

    #[test]
    fn test_post_neighbours_in_context() {
        let dir = TempDir::new().unwrap();
        let body = "---\n---\n{% if page.previous %}{{ page.previous.slug }}{% endif %}|\
                    {% if page.next %}{{ page.next.slug }}{% endif %}";
        write(dir.path(), "_posts/2024-01-01-a.html", body);
        write(dir.path(), "_posts/2024-01-02-b.html", body);
        write(dir.path(), "_posts/2024-01-03-c.html", body);

        build(&dir, "[build]\npermalink = \"none\"");
        assert_eq!(read(&dir, "a.html"), "|b");
        assert_eq!(read(&dir, "b.html"), "a|c");
        assert_eq!(read(&dir, "c.html"), "b|");
    }

    #[test]
    fn test_traversal_permalink_stays_inside_destination() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/evil.md", "---\npermalink: /../../../escape/\n---\nx");
        write(dir.path(), "src/_config.toml", "");
        let config = SiteConfig::load(&dir.path().join("src"), Path::new("_config.toml")).unwrap();
        Builder::new(config).build().unwrap();

        assert!(!dir.path().join("escape").exists());
        assert!(dir.path().join("src/_site/escape/index.html").is_file());
    }

    #[test]
    fn test_broken_document_is_fatal_with_path() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "ok.html", "---\n---\nfine");
        write(dir.path(), "broken.html", "---\n---\n{% if %}");

        let result = Builder::new(config(&dir, "")).build();
        match result {
            Err(BuildError::Document { path, .. }) => assert_eq!(path, "broken.html"),
            other => panic!("expected document error, got {other:?}"),
        }
    }

    #[test]
    fn test_unpublished_page_skipped() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "wip.md", "---\npublished: false\n---\nwip");
        build(&dir, "");
        assert!(!site_dir(&dir).join("wip.html").exists());
    }

    #[test]
    fn test_colliding_outputs_later_wins() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.md", "---\npermalink: /same/\n---\nfirst");
        write(dir.path(), "b.md", "---\npermalink: /same/\n---\nsecond");
        build(&dir, "");
        assert!(read(&dir, "same/index.html").contains("second"));
    }

    #[test]
    fn test_theme_assets_site_overrides() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "_themes/t/assets/css/main.css", "theme");
        write(dir.path(), "_themes/t/assets/js/app.js", "theme js");
        write(dir.path(), "_themes/t/_layouts/default.html", "[{{ content }}]");
        write(dir.path(), "assets/css/main.css", "site");
        write(dir.path(), "index.html", "---\nlayout: default\n---\nhome");

        build(&dir, "[theme]\nname = \"t\"");
        assert_eq!(read(&dir, "assets/css/main.css"), "site");
        assert_eq!(read(&dir, "assets/js/app.js"), "theme js");
        assert_eq!(read(&dir, "index.html"), "[home]");
    }

    #[test]
    fn test_unchanged_static_file_not_recopied() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "img/a.png", "png");
        let config = config(&dir, "[build]\nclean = false");
        assert_eq!(Builder::new(config.clone()).build().unwrap().copied, 1);
        assert_eq!(Builder::new(config).build().unwrap().copied, 0);
    }

    struct Robots;

    impl Generator for Robots {
        fn name(&self) -> &str {
            "robots"
        }

        fn generate(&self, site: &Site) -> anyhow::Result<GeneratorOutput> {
            let doc = Document::from_source(
                "tags/index.md",
                &site.source,
                DocumentKind::Page,
                "---\ntitle: Tags\n---\n# {{ page.title }} ({{ site.posts | length }})",
                Some(&site.config),
            )?;
            Ok(GeneratorOutput {
                files: vec![
                    GeneratedFile::new("robots.txt", "User-agent: *"),
                    GeneratedFile::new("../outside.txt", "nope"),
                ],
                documents: vec![doc],
            })
        }
    }

    #[test]
    fn test_custom_generator_output() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "_posts/2024-01-01-a.md", "---\n---\n");
        let config = config(&dir, "[build]\nclean = false");
        let mut registry = PluginRegistry::with_defaults(&config);
        registry.register_generator(Box::new(Robots));
        let mut builder = Builder::with_registry(config, registry);
        let report = builder.build().unwrap();

        assert_eq!(read(&dir, "robots.txt"), "User-agent: *");
        assert!(read(&dir, "tags/index.html").contains("<h1>Tags (1)</h1>"));
        assert!(!dir.path().join("outside.txt").exists());
        assert!(site_dir(&dir).join("outside.txt").is_file());
        assert_eq!(report.generated, 3);

        let again = builder.build().unwrap();
        assert_eq!(again.generated, 1, "only the rendered document is rewritten");
    }

    #[test]
    fn test_builtin_plugins() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "_posts/2024-01-01-a.md", "---\ntitle: A\n---\nhi");
        build(
            &dir,
            "[site]\nurl = \"https://example.com\"\n[plugins]\nsitemap = true\nfeed = true",
        );
        assert!(read(&dir, "sitemap.xml").contains("https://example.com/2024/01/01/a.html"));
        assert!(read(&dir, "feed.xml").contains("<title>A</title>"));
    }

    #[test]
    fn test_clean_site_removes_output_and_cache() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "index.md", "---\n---\nhome");
        write(dir.path(), "_site/.git/HEAD", "ref");
        let config = config(&dir, "[build]\nincremental = true");
        Builder::new(config.clone()).build().unwrap();
        assert!(config.cache_dir().exists());

        clean_site(&config).unwrap();
        assert!(!config.cache_dir().exists());
        assert!(!site_dir(&dir).join("index.html").exists());
        assert!(site_dir(&dir).join(".git/HEAD").exists());
    }

    #[test]
    fn test_missing_source_is_fatal() {
        let dir = TempDir::new().unwrap();
        let mut config = SiteConfig::default();
        config.source = dir.path().join("nowhere");
        let result = Builder::new(config).build();
        assert!(matches!(result, Err(BuildError::FileSystem { .. })));
    }
}
