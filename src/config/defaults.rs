//! Default values for configuration fields.
//!
//! These functions are used by serde for default deserialization.

// ============================================================================
// Common Defaults
// ============================================================================

pub fn r#true() -> bool {
    true
}

pub fn r#false() -> bool {
    false
}

// ============================================================================
// [site] Section Defaults
// ============================================================================

pub mod site {
    pub fn title() -> String {
        "My Site".into()
    }

    pub fn language() -> String {
        "en".into()
    }
}

// ============================================================================
// [build] Section Defaults
// ============================================================================

pub mod build {
    use std::path::PathBuf;

    pub fn destination() -> PathBuf {
        "_site".into()
    }

    pub fn layouts_dir() -> String {
        "_layouts".into()
    }

    pub fn includes_dir() -> String {
        "_includes".into()
    }

    pub fn data_dir() -> String {
        "_data".into()
    }

    pub fn posts_dir() -> String {
        "_posts".into()
    }

    pub fn drafts_dir() -> String {
        "_drafts".into()
    }

    pub fn cache_dir() -> String {
        ".kiln-cache".into()
    }

    pub fn markdown_ext() -> Vec<String> {
        ["md", "markdown", "mkd", "mkdn", "mdown"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    pub fn keep_files() -> Vec<String> {
        vec![".git".into(), ".svn".into()]
    }

    pub fn exclude() -> Vec<String> {
        [
            "Gemfile",
            "Gemfile.lock",
            "node_modules",
            "vendor",
            "Cargo.toml",
            "Cargo.lock",
            "target",
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }
}

// ============================================================================
// [serve] Section Defaults
// ============================================================================

pub mod serve {
    pub fn interface() -> String {
        "127.0.0.1".into()
    }

    pub fn port() -> u16 {
        4000
    }

    pub fn livereload_port() -> u16 {
        35729
    }
}

// ============================================================================
// [plugins] Section Defaults
// ============================================================================

pub mod plugins {
    pub fn feed_path() -> String {
        "feed.xml".into()
    }

    pub fn feed_limit() -> usize {
        10
    }
}
