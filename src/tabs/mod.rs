//! Tab enumeration and selection
//!
//! - [`TabCatalog`]: deterministic, 1-based indexing of the tabs open in a session
//! - [`TabResolver`]: maps a user pattern (index, range, URL, substring, regex) onto catalog entries

pub mod catalog;
pub mod resolver;

pub use catalog::{PageMetadata, TabCatalog, TabDescriptor};
pub use resolver::{MatchResult, MatchStage, TabResolver};
