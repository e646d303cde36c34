//! `[collections]` and `[[defaults]]` sections.
//!
//! Collections keep their declaration order, which is observable through
//! `site.collections` in templates.

use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{MapAccess, Visitor},
    ser::SerializeMap,
};
use std::fmt;

// ============================================================================
// Collections
// ============================================================================

/// `[collections.<name>]` - one user-defined document group read from `_<name>/`.
///
/// # Example
/// ```toml
/// [collections.recipes]
/// output = true
/// permalink = "/cookbook/:title/"
/// sort_by = "order"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectionConfig {
    /// Collection name, taken from the table key.
    #[serde(skip)]
    pub name: String,

    /// Render the collection's documents to the destination.
    #[serde(default)]
    pub output: bool,

    /// Permalink pattern for documents of this collection.
    #[serde(default)]
    pub permalink: Option<String>,

    /// Front-matter key used to order documents (falls back to path order).
    #[serde(default)]
    pub sort_by: Option<String>,
}

impl CollectionConfig {
    /// Source directory name, `_<name>`.
    pub fn directory(&self) -> String {
        format!("_{}", self.name)
    }
}

/// Ordered list of configured collections.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collections(pub Vec<CollectionConfig>);

impl Collections {
    pub fn get(&self, name: &str) -> Option<&CollectionConfig> {
        self.0.iter().find(|c| c.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CollectionConfig> {
        self.0.iter()
    }
}

impl<'de> Deserialize<'de> for Collections {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CollectionsVisitor;

        impl<'de> Visitor<'de> for CollectionsVisitor {
            type Value = Collections;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a table of collection definitions")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Collections, A::Error> {
                let mut collections = Vec::new();
                while let Some((name, mut config)) = map.next_entry::<String, CollectionConfig>()? {
                    config.name = name;
                    collections.push(config);
                }
                Ok(Collections(collections))
            }
        }

        deserializer.deserialize_map(CollectionsVisitor)
    }
}

impl Serialize for Collections {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for collection in &self.0 {
            map.serialize_entry(&collection.name, collection)?;
        }
        map.end()
    }
}

// ============================================================================
// Front-matter defaults
// ============================================================================

/// `[[defaults]]` - front-matter values applied to documents matching a scope.
///
/// # Example
/// ```toml
/// [[defaults]]
/// scope = { path = "", type = "posts" }
/// values = { layout = "post", comments = true }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FrontMatterDefault {
    #[serde(default)]
    pub scope: DefaultScope,

    #[serde(default)]
    pub values: serde_json::Map<String, serde_json::Value>,
}

/// Which documents a `[[defaults]]` entry applies to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DefaultScope {
    /// Source-relative path prefix or glob; empty matches everything.
    #[serde(default)]
    pub path: String,

    /// `pages`, `posts`, `drafts` or a collection name.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl DefaultScope {
    /// Check whether a document at `relative_path` of type `kind` is in scope.
    pub fn matches(&self, relative_path: &str, kind: &str) -> bool {
        if let Some(scope_kind) = &self.kind
            && scope_kind != kind
        {
            return false;
        }

        let scope_path = self.path.trim_matches('/');
        if scope_path.is_empty() {
            return true;
        }
        if scope_path.contains('*') {
            return glob::Pattern::new(scope_path).is_ok_and(|p| p.matches(relative_path));
        }
        relative_path == scope_path
            || relative_path
                .strip_prefix(scope_path)
                .is_some_and(|rest| rest.starts_with('/'))
    }

    /// Specificity used to order matching entries (longer paths win).
    pub fn specificity(&self) -> usize {
        self.path.trim_matches('/').len() + usize::from(self.kind.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::super::SiteConfig;
    use super::*;

    #[test]
    fn test_collections_keep_declaration_order() {
        let config = r#"
            [collections.zebra]
            output = true

            [collections.apple]
            permalink = "/fruit/:title/"

            [collections.mango]
            sort_by = "order"
        "#;
        let config: SiteConfig = toml::from_str(config).unwrap();
        let names: Vec<_> = config.collections.iter().map(|c| c.name.as_str()).collect();

        assert_eq!(names, vec!["zebra", "apple", "mango"]);
        assert!(config.collections.get("zebra").unwrap().output);
        assert!(!config.collections.get("apple").unwrap().output);
        assert_eq!(config.collections.get("mango").unwrap().directory(), "_mango");
    }

    #[test]
    fn test_collection_rejects_unknown_fields() {
        let config = r#"
            [collections.recipes]
            outptu = true
        "#;
        assert!(toml::from_str::<SiteConfig>(config).is_err());
    }

    #[test]
    fn test_defaults_parse() {
        let config = r#"
            [[defaults]]
            scope = { path = "", type = "posts" }
            values = { layout = "post" }

            [[defaults]]
            scope = { path = "docs" }
            values = { layout = "doc", toc = true }
        "#;
        let config: SiteConfig = toml::from_str(config).unwrap();

        assert_eq!(config.defaults.len(), 2);
        assert_eq!(config.defaults[0].scope.kind.as_deref(), Some("posts"));
        assert_eq!(config.defaults[1].values["toc"], serde_json::json!(true));
    }

    #[test]
    fn test_scope_matches() {
        let all_posts = DefaultScope {
            path: String::new(),
            kind: Some("posts".into()),
        };
        assert!(all_posts.matches("_posts/2024-01-01-a.md", "posts"));
        assert!(!all_posts.matches("about.md", "pages"));

        let docs = DefaultScope {
            path: "docs/".into(),
            kind: None,
        };
        assert!(docs.matches("docs/intro.md", "pages"));
        assert!(docs.matches("docs", "pages"));
        assert!(!docs.matches("docsearch.md", "pages"));

        let glob = DefaultScope {
            path: "guides/*.md".into(),
            kind: None,
        };
        assert!(glob.matches("guides/setup.md", "pages"));
        assert!(!glob.matches("other/setup.md", "pages"));
    }

    #[test]
    fn test_scope_specificity() {
        let broad = DefaultScope::default();
        let narrow = DefaultScope {
            path: "docs/api".into(),
            kind: Some("pages".into()),
        };
        assert!(narrow.specificity() > broad.specificity());
    }
}
