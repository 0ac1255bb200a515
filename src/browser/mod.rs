//! Browser session management
//!
//! A [`BrowserSession`] either attaches to a browser already listening on the
//! remote-debugging port or launches a new one, and decides on close whether that
//! browser is shut down.

pub mod config;
pub mod probe;
pub mod session;

pub use config::{ConnectionOptions, LaunchOptions, SessionConfig, DEFAULT_PORT};
pub use probe::{PortStatus, VersionInfo};
pub use session::{discover_executable, BrowserFamily, BrowserSession, EmergencyCleanup, SessionMode};
