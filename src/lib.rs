//! # snag
//!
//! Fetch rendered page content out of a Chrome/Chromium browser via the Chrome DevTools Protocol (CDP),
//! either from freshly opened URLs or from tabs that are already open.
//!
//! ## Features
//!
//! - **Attach or launch**: reuse a browser listening on the remote-debugging port, or start a headless
//!   (torn down afterwards) or visible (left running) one
//! - **Tab selection**: pick open tabs by 1-based index, range (`2-4`), exact URL, substring or regex
//! - **Formats**: markdown, HTML, plain text, PDF and PNG
//! - **Batch output**: timestamped, slugged filenames that never overwrite existing files
//! - **Cleanup**: kill debug-enabled browsers by port or by executable
//!
//! ## CLI
//!
//! ```bash
//! # Markdown of a page to stdout
//! snag example.com
//!
//! # Every open tab as PDF into ./pages
//! snag --all-tabs --format pdf --output-dir pages
//!
//! # Tabs whose URL matches a regex
//! snag --tab 'github\.com/.*/pull'
//! ```
//!
//! ## Library Usage
//!
//! ```rust,no_run
//! use snag::{BrowserSession, SessionConfig, TabResolver};
//!
//! # fn main() -> snag::Result<()> {
//! let mut session = BrowserSession::connect(&SessionConfig::default())?;
//! let catalog = session.enumerate_tabs()?;
//!
//! let matched = TabResolver::new(&catalog).resolve("docs")?;
//! for tab in &matched.tabs {
//!     println!("[{}] {}", tab.index, tab.url);
//! }
//!
//! session.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - [`browser`]: Session lifecycle, configuration and port probes
//! - [`tabs`]: Tab catalog and pattern resolution
//! - [`batch`]: Sequential multi-target processing
//! - [`convert`]: Page-to-format conversion
//! - [`filename`]: Output naming and conflict resolution
//! - [`operations`]: Top-level operations used by the CLI
//! - [`reaper`]: Terminating debug-enabled browser processes
//! - [`error`]: Error types and result aliases

pub mod batch;
pub mod browser;
pub mod convert;
pub mod error;
pub mod filename;
pub mod format;
pub mod operations;
pub mod reaper;
pub mod tabs;
pub mod utils;

pub use batch::{BatchExecutor, BatchItem, BatchOptions, BatchOutcome, BatchReport, PageOpener};
pub use browser::{BrowserFamily, BrowserSession, ConnectionOptions, LaunchOptions, SessionConfig, SessionMode};
pub use convert::{ChromeConverter, ContentConverter, PageSource};
pub use error::{BrowserError, Result};
pub use format::Format;
pub use operations::{FetchOptions, Invocation, TabSelection};
pub use tabs::{MatchResult, MatchStage, TabCatalog, TabDescriptor, TabResolver};
