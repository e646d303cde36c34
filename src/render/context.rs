//! Template context construction.
//!
//! The `site` value is built once per build; each document then gets a
//! `page` value of its own. Lists inside `site` carry document summaries
//! (front matter plus URL fields) without bodies.

use crate::{content::Document, site::Site};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Build the `site` template value.
///
/// `posts` is newest first. Collections appear both as the ordered
/// `collections` list and as `site.<name>`.
pub fn site_value(site: &Site) -> Value {
    let config = &site.config;
    let mut map = Map::new();

    for (key, value) in &config.extra {
        if let Ok(value) = serde_json::to_value(value) {
            map.insert(key.clone(), value);
        }
    }

    let visible: Vec<&Document> = site.visible_posts().collect();
    let posts: Vec<Value> = visible.iter().rev().map(|doc| summary(doc)).collect();

    let mut collections = Vec::with_capacity(site.collections.len());
    for collection in &site.collections {
        let docs: Vec<Value> = collection
            .docs
            .iter()
            .filter(|doc| doc.is_published() || config.build.drafts)
            .map(summary)
            .collect();
        collections.push(json!({
            "label": collection.name(),
            "output": collection.config.output,
            "docs": docs.clone(),
        }));
        map.insert(collection.name().to_owned(), Value::Array(docs));
    }

    let pages: Vec<Value> = site.pages.iter().map(summary).collect();

    let site_section = &config.site;
    let builtins = [
        ("title", json!(site_section.title)),
        ("description", json!(site_section.description)),
        ("url", json!(site_section.url.trim_end_matches('/'))),
        ("baseurl", json!(site_section.base_path())),
        ("author", json!(site_section.author)),
        ("language", json!(site_section.language)),
        ("time", json!(site.time.format(DATE_FORMAT).to_string())),
        ("pages", Value::Array(pages)),
        ("posts", Value::Array(posts)),
        ("collections", Value::Array(collections)),
        ("data", site.data.clone()),
        ("categories", term_index(&visible, |doc| &doc.front_matter.categories)),
        ("tags", term_index(&visible, |doc| &doc.front_matter.tags)),
    ];
    for (key, value) in builtins {
        map.insert(key.to_owned(), value);
    }
    Value::Object(map)
}

/// Front matter plus the derived fields every template sees.
pub fn summary(doc: &Document) -> Value {
    let mut map = match serde_json::to_value(&doc.front_matter) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    map.insert("title".into(), json!(doc.title()));
    map.insert("url".into(), json!(doc.url));
    map.insert("date".into(), json!(doc.date.format(DATE_FORMAT).to_string()));
    map.insert("path".into(), json!(doc.relative_path));
    map.insert("slug".into(), json!(doc.slug));
    map.insert("collection".into(), json!(doc.collection));
    map.insert("draft".into(), json!(doc.is_draft || doc.front_matter.draft));
    Value::Object(map)
}

/// The `page` value: the summary, the body, and post neighbours.
pub fn page_value(
    doc: &Document,
    content: &str,
    previous: Option<&Document>,
    next: Option<&Document>,
) -> Value {
    let mut page = summary(doc);
    if let Value::Object(map) = &mut page {
        map.insert("content".into(), json!(content));
        map.insert("previous".into(), previous.map_or(Value::Null, summary));
        map.insert("next".into(), next.map_or(Value::Null, summary));
    }
    page
}

/// `name → [post summary]`, names sorted, posts newest first.
fn term_index<'a, F>(posts: &[&'a Document], terms: F) -> Value
where
    F: Fn(&'a Document) -> &'a Vec<String>,
{
    let mut index: BTreeMap<&str, Vec<Value>> = BTreeMap::new();
    for doc in posts.iter().rev().copied() {
        for term in terms(doc) {
            index.entry(term.as_str()).or_default().push(summary(doc));
        }
    }
    Value::Object(
        index
            .into_iter()
            .map(|(term, docs)| (term.to_owned(), Value::Array(docs)))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiteConfig;
    use std::{fs, path::Path};
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn read_site(dir: &TempDir, toml: &str) -> Site {
        write(dir.path(), "_config.toml", toml);
        let config = SiteConfig::load(dir.path(), Path::new("_config.toml")).unwrap();
        let mut site = Site::new(config).unwrap();
        site.read().unwrap();
        site
    }

    #[test]
    fn test_site_value_fields() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "_posts/2024-01-01-one.md", "---\ntitle: One\ntags: [rust]\n---\n");
        write(dir.path(), "_posts/2024-02-01-two.md", "---\ncategories: news\ntags: [rust, web]\n---\n");
        write(dir.path(), "_recipes/cake.md", "---\ntitle: Cake\n---\n");
        write(dir.path(), "index.md", "---\n---\n");

        let site = read_site(
            &dir,
            "[site]\ntitle = \"T\"\nbaseurl = \"/b\"\n[collections.recipes]\noutput = true\n[extra]\ntwitter = \"@x\"\ntitle = \"ignored\"",
        );
        let value = site_value(&site);

        assert_eq!(value["title"], "T");
        assert_eq!(value["baseurl"], "/b");
        assert_eq!(value["twitter"], "@x");
        assert_eq!(value["posts"][0]["slug"], "two");
        assert_eq!(value["posts"][1]["title"], "One");
        assert_eq!(value["pages"].as_array().unwrap().len(), 1);
        assert_eq!(value["collections"][0]["label"], "recipes");
        assert_eq!(value["recipes"][0]["title"], "Cake");
        assert_eq!(value["tags"]["rust"].as_array().unwrap().len(), 2);
        assert_eq!(value["tags"]["web"][0]["slug"], "two");
        assert_eq!(value["categories"]["news"][0]["slug"], "two");
    }

    #[test]
    fn test_page_value_neighbours() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "_posts/2024-01-01-one.md", "---\nauthor: sam\n---\n");
        write(dir.path(), "_posts/2024-02-01-two.md", "---\n---\n");
        let site = read_site(&dir, "");

        let page = page_value(&site.posts[0], "<p>x</p>", None, Some(&site.posts[1]));
        assert_eq!(page["content"], "<p>x</p>");
        assert_eq!(page["author"], "sam");
        assert_eq!(page["date"], "2024-01-01 00:00:00");
        assert_eq!(page["path"], "_posts/2024-01-01-one.md");
        assert!(page["previous"].is_null());
        assert_eq!(page["next"]["slug"], "two");
    }
}
