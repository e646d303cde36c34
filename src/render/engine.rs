//! Template engines.
//!
//! [`TemplateEngine`] is the seam the renderer talks to; [`JinjaEngine`] is
//! the default implementation. Engines are built on demand and cached per
//! option set in an [`EngineCache`].

use super::filters::{self, UrlBase};
use crate::{debug, error::RenderError, theme::ThemeManager};
use minijinja::{AutoEscape, Environment, Error, ErrorKind, UndefinedBehavior};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::{fs, sync::Arc};

/// A string-to-string filter that plugins can add to an engine.
pub type StringFilter = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Renders a template source against a JSON context.
pub trait TemplateEngine: Send + Sync {
    /// Render `template`; `name` is used for diagnostics.
    fn render(&self, name: &str, template: &str, context: &Value) -> Result<String, RenderError>;

    fn register_filter(&mut self, name: &str, filter: StringFilter);
}

// ============================================================================
// MiniJinja
// ============================================================================

/// Engine construction options. Each distinct value gets its own engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct EngineOptions {
    /// Fail on undefined variables instead of rendering them empty.
    pub strict_variables: bool,
}

/// MiniJinja engine with the built-in filters and an include loader that
/// resolves through the theme manager.
pub struct JinjaEngine {
    env: Environment<'static>,
}

impl JinjaEngine {
    pub fn new(themes: ThemeManager, base: UrlBase, options: EngineOptions) -> Self {
        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.set_undefined_behavior(if options.strict_variables {
            UndefinedBehavior::Strict
        } else {
            UndefinedBehavior::Chainable
        });
        env.set_loader(move |name| load_include(&themes, name));
        filters::register(&mut env, base);
        Self { env }
    }
}

impl TemplateEngine for JinjaEngine {
    fn render(&self, name: &str, template: &str, context: &Value) -> Result<String, RenderError> {
        self.env
            .render_named_str(name, template, context)
            .map_err(|source| RenderError::Template {
                name: name.to_owned(),
                source,
            })
    }

    fn register_filter(&mut self, name: &str, filter: StringFilter) {
        self.env.add_filter(name.to_owned(), move |value: String| filter(&value));
    }
}

/// Loader callback: includes resolve site-first, then theme.
fn load_include(themes: &ThemeManager, name: &str) -> Result<Option<String>, Error> {
    match themes.resolve_include(name) {
        Ok(Some(path)) => fs::read_to_string(&path).map(Some).map_err(|e| {
            Error::new(
                ErrorKind::InvalidOperation,
                format!("cannot read include {}: {e}", path.display()),
            )
        }),
        Ok(None) => Ok(None),
        Err(err) => Err(Error::new(ErrorKind::InvalidOperation, err.to_string())),
    }
}

// ============================================================================
// EngineCache
// ============================================================================

/// Engines keyed by their options, constructed on first use.
#[derive(Default)]
pub struct EngineCache {
    engines: Mutex<FxHashMap<EngineOptions, Arc<dyn TemplateEngine>>>,
}

impl EngineCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached engine for `options`, or the one `build` creates.
    pub fn get_or_create<F>(&self, options: EngineOptions, build: F) -> Arc<dyn TemplateEngine>
    where
        F: FnOnce() -> Arc<dyn TemplateEngine>,
    {
        let mut engines = self.engines.lock();
        engines
            .entry(options)
            .or_insert_with(|| {
                debug!("render"; "template engine ready (strict_variables = {})", options.strict_variables);
                build()
            })
            .clone()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.engines.lock().len()
    }
}
