use thiserror::Error;

/// Errors produced while driving the browser and writing page content
#[derive(Debug, Error)]
pub enum BrowserError {
    /// No compatible Chrome/Chromium executable could be found on this host
    #[error("browser not found: {0}")]
    BrowserNotFound(String),

    /// The attach or launch handshake with the DevTools endpoint failed
    #[error("failed to connect to browser: {0}")]
    ConnectionFailed(String),

    /// The browser process could not be started
    #[error("failed to launch browser: {0}")]
    LaunchFailed(String),

    /// The operation needs an already-running browser and none answered on the port
    #[error("no browser running with remote debugging on port {port}")]
    NoBrowserRunning { port: u16 },

    #[error("tab index {index} is out of range (1-{count} available)")]
    TabIndexInvalid { index: usize, count: usize },

    #[error("tab range {start}-{end} is out of range (1-{count} available)")]
    RangeOutOfBounds { start: usize, end: usize, count: usize },

    #[error("no tab matches pattern '{0}'")]
    NoTabMatch(String),

    #[error("invalid tab pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("could not find a free filename for '{name}' after {attempts} attempts")]
    ConflictResolutionExhausted { name: String, attempts: usize },

    #[error("tab operation failed: {0}")]
    TabOperationFailed(String),

    #[error("navigation failed: {0}")]
    NavigationFailed(String),

    #[error("timed out waiting for '{selector}': {reason}")]
    WaitTimeout { selector: String, reason: String },

    #[error("content conversion to {format} failed: {reason}")]
    ConversionFailed { format: String, reason: String },

    /// Aggregate result of a batch with at least one failed item
    #[error("{succeeded} succeeded, {failed} failed")]
    BatchFailed { succeeded: usize, failed: usize },

    #[error("process lookup failed: {0}")]
    ProcessLookupFailed(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BrowserError {
    /// Whether the caller should show the tab catalog so the user can fix their pattern
    pub fn shows_catalog(&self) -> bool {
        matches!(
            self,
            BrowserError::NoTabMatch(_)
                | BrowserError::TabIndexInvalid { .. }
                | BrowserError::RangeOutOfBounds { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, BrowserError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolver_errors_show_catalog() {
        assert!(BrowserError::NoTabMatch("x".into()).shows_catalog());
        assert!(BrowserError::TabIndexInvalid { index: 3, count: 2 }.shows_catalog());
        assert!(BrowserError::RangeOutOfBounds { start: 1, end: 5, count: 3 }.shows_catalog());
        assert!(!BrowserError::NoBrowserRunning { port: 9222 }.shows_catalog());
    }

    #[test]
    fn test_batch_failed_message() {
        let err = BrowserError::BatchFailed { succeeded: 2, failed: 1 };
        assert_eq!(err.to_string(), "2 succeeded, 1 failed");
    }
}
