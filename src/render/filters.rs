//! Built-in template filters.
//!
//! | Filter              | Example                                         |
//! |---------------------|-------------------------------------------------|
//! | `relative_url`      | `"/css/a.css"` → `/blog/css/a.css`              |
//! | `absolute_url`      | `"/feed.xml"` → `https://x.org/blog/feed.xml`   |
//! | `date_to_string`    | `2024-01-15 00:00:00` → `15 Jan 2024`           |
//! | `date_to_xmlschema` | `2024-01-15 00:00:00` → `2024-01-15T00:00:00+…` |
//! | `date(fmt)`         | strftime formatting                             |
//! | `slugify`           | `"Hello World"` → `hello-world`                 |
//! | `xml_escape`        | `a < b` → `a &lt; b`                            |
//! | `jsonify`           | any value → JSON                                |
//! | `number_of_words`   | whitespace-separated word count                 |

use crate::{
    config::SiteConfig,
    utils::{
        date::{parse_date, to_xmlschema},
        slug::slugify_ascii,
    },
};
use minijinja::{Environment, Error, ErrorKind, Value};

/// Site values the URL filters need.
#[derive(Debug, Clone, Default)]
pub struct UrlBase {
    /// `scheme://host`, no trailing slash (may be empty).
    pub origin: String,
    /// `""` or `/prefix`.
    pub base_path: String,
}

impl UrlBase {
    pub fn from_config(config: &SiteConfig) -> Self {
        Self {
            origin: config.site.url.trim_end_matches('/').to_owned(),
            base_path: config.site.base_path(),
        }
    }
}

/// Add every built-in filter to `env`.
pub fn register(env: &mut Environment<'static>, base: UrlBase) {
    let relative_base = base.clone();
    env.add_filter("relative_url", move |value: Value| {
        relative_url(&relative_base, &text(&value))
    });
    env.add_filter("absolute_url", move |value: Value| absolute_url(&base, &text(&value)));
    env.add_filter("date_to_string", |value: Value| format_date(&text(&value), "%d %b %Y"));
    env.add_filter("date_to_xmlschema", |value: Value| {
        let raw = text(&value);
        parse_date(&raw).map_or(raw, |dt| to_xmlschema(&dt))
    });
    env.add_filter("date", |value: Value, format: String| format_date(&text(&value), &format));
    env.add_filter("slugify", |value: Value| slugify_ascii(&text(&value)));
    env.add_filter("xml_escape", |value: Value| xml_escape(&text(&value)));
    env.add_filter("jsonify", jsonify);
    env.add_filter("number_of_words", |value: Value| number_of_words(&text(&value)));
}

// ============================================================================
// Filter bodies
// ============================================================================

/// Prefix a site path with `baseurl`. Absolute URLs pass through.
pub fn relative_url(base: &UrlBase, url: &str) -> String {
    if is_absolute_url(url) {
        return url.to_owned();
    }
    format!("{}/{}", base.base_path, url.trim_start_matches('/'))
}

/// `relative_url` prefixed with the site origin.
pub fn absolute_url(base: &UrlBase, url: &str) -> String {
    if is_absolute_url(url) {
        return url.to_owned();
    }
    format!("{}{}", base.origin, relative_url(base, url))
}

fn is_absolute_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://") || url.starts_with("//")
}

/// Reformat a date string; unparseable input is returned as-is.
pub fn format_date(raw: &str, format: &str) -> String {
    parse_date(raw).map_or_else(|| raw.to_owned(), |dt| dt.format(format).to_string())
}

pub fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn jsonify(value: Value) -> Result<String, Error> {
    serde_json::to_string(&value)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, format!("jsonify: {e}")))
}

pub fn number_of_words(s: &str) -> usize {
    s.split_whitespace().count()
}

/// String form of a template value; undefined and none become empty.
fn text(value: &Value) -> String {
    if value.is_undefined() || value.is_none() {
        String::new()
    } else if let Some(s) = value.as_str() {
        s.to_owned()
    } else {
        value.to_string()
    }
}
