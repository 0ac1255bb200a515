use std::{path::PathBuf, time::Duration};

/// Default remote-debugging port
pub const DEFAULT_PORT: u16 = 9222;

/// Options for launching a new browser instance
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub window_width: u32,
    pub window_height: u32,

    /// Explicit browser executable; discovered on the host when `None`
    pub chrome_path: Option<PathBuf>,

    /// Profile directory; a temporary one is created when `None`
    pub user_data_dir: Option<PathBuf>,

    /// User agent override applied at launch
    pub user_agent: Option<String>,

    /// Enable the Chrome sandbox
    pub sandbox: bool,

    /// Remote-debugging port for the launched browser
    pub port: u16,

    /// How long to wait for a launched browser to accept connections
    pub launch_timeout: Duration,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            window_width: 1280,
            window_height: 800,
            chrome_path: None,
            user_data_dir: None,
            user_agent: None,
            sandbox: true,
            port: DEFAULT_PORT,
            launch_timeout: Duration::from_secs(30),
        }
    }
}

impl LaunchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn window_size(mut self, width: u32, height: u32) -> Self {
        self.window_width = width;
        self.window_height = height;
        self
    }

    pub fn chrome_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.chrome_path = Some(path.into());
        self
    }

    pub fn user_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.user_data_dir = Some(dir.into());
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn sandbox(mut self, sandbox: bool) -> Self {
        self.sandbox = sandbox;
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn launch_timeout(mut self, timeout: Duration) -> Self {
        self.launch_timeout = timeout;
        self
    }
}

/// Options for attaching to a browser that is already listening on a debugging port
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub port: u16,

    /// Handshake timeout in milliseconds
    pub timeout: u64,
}

impl ConnectionOptions {
    pub fn new(port: u16) -> Self {
        Self { port, timeout: 3000 }
    }

    pub fn timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout = timeout_ms;
        self
    }

    /// Base URL of the DevTools HTTP endpoint
    pub fn endpoint(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self::new(DEFAULT_PORT)
    }
}

/// Everything [`BrowserSession::connect`](super::BrowserSession::connect) needs to attach or launch
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub connection: ConnectionOptions,
    pub launch: LaunchOptions,

    /// Skip the attach attempt and always launch headless
    pub force_headless: bool,

    /// Launch with a visible window when no browser is running
    pub open_visible: bool,
}

impl SessionConfig {
    pub fn new(port: u16) -> Self {
        Self {
            connection: ConnectionOptions::new(port),
            launch: LaunchOptions::new().port(port),
            ..Default::default()
        }
    }

    pub fn force_headless(mut self, force: bool) -> Self {
        self.force_headless = force;
        self
    }

    pub fn open_visible(mut self, visible: bool) -> Self {
        self.open_visible = visible;
        self
    }

    pub fn launch(mut self, launch: LaunchOptions) -> Self {
        self.launch = launch;
        self
    }

    pub fn port(&self) -> u16 {
        self.connection.port
    }

    /// Headless unless a visible window was explicitly requested and not overridden
    pub fn launches_headless(&self) -> bool {
        self.force_headless || !self.open_visible
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_options_builder() {
        let opts = LaunchOptions::new()
            .sandbox(false)
            .window_size(800, 600)
            .user_agent("snag-test")
            .port(9333);

        assert!(!opts.sandbox);
        assert_eq!(opts.window_width, 800);
        assert_eq!(opts.window_height, 600);
        assert_eq!(opts.user_agent.as_deref(), Some("snag-test"));
        assert_eq!(opts.port, 9333);
    }

    #[test]
    fn test_connection_options() {
        let opts = ConnectionOptions::new(9333).timeout(5000);

        assert_eq!(opts.endpoint(), "http://127.0.0.1:9333");
        assert_eq!(opts.timeout_duration(), Duration::from_secs(5));
    }

    #[test]
    fn test_headless_selection() {
        assert!(SessionConfig::new(9222).launches_headless());
        assert!(!SessionConfig::new(9222).open_visible(true).launches_headless());
        assert!(SessionConfig::new(9222).open_visible(true).force_headless(true).launches_headless());
    }

    #[test]
    fn test_session_config_port_propagates() {
        let config = SessionConfig::new(9444);
        assert_eq!(config.port(), 9444);
        assert_eq!(config.launch.port, 9444);
    }
}
