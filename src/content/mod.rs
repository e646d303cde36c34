//! Content model: documents, static files and front matter.

mod document;
pub mod front_matter;
mod static_file;

pub use document::Document;
pub use front_matter::has_front_matter;
pub use static_file::StaticFile;

/// Where a document was found, fixed at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    Page,
    Post,
    Layout,
    Include,
    Collection,
}

impl DocumentKind {
    /// Scope type matched by `[[defaults]]`; layouts and includes have none.
    pub fn scope_name<'a>(&self, collection: Option<&'a str>) -> Option<&'a str> {
        match self {
            Self::Page => Some("pages"),
            Self::Post => Some("posts"),
            Self::Collection => collection,
            Self::Layout | Self::Include => None,
        }
    }
}
