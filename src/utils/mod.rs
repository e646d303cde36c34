//! Shared helpers: path safety, slugs and dates.

pub mod date;
pub mod path;
pub mod slug;
