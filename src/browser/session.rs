use crate::{browser::{config::{ConnectionOptions, LaunchOptions, SessionConfig},
                      probe::{self, VersionInfo}},
            error::{BrowserError, Result},
            tabs::{PageMetadata, TabCatalog}};
use headless_chrome::{Browser, Tab};
use std::{ffi::{OsStr, OsString},
          fs,
          path::{Path, PathBuf},
          process::{Command, Stdio},
          sync::Arc,
          thread,
          time::{Duration, Instant}};
use tempfile::TempDir;

/// Idle timeout for the CDP connection; the default of 30 seconds is too short for slow pages
const IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Flag every browser started with remote debugging carries on its command line
pub const DEBUG_PORT_MARKER: &str = "--remote-debugging-port";

/// How the session got hold of its browser
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Connected to a browser the user was already running
    Attached,
    /// Started a headless browser that is torn down on close
    LaunchedHeadless,
    /// Started a visible browser that is left running on close
    LaunchedVisible,
}

/// Browser vendor, derived from the executable name or the reported product
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserFamily {
    Chrome,
    Chromium,
    Edge,
    Brave,
    Unknown,
}

impl BrowserFamily {
    pub fn from_executable(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        if name.contains("brave") {
            BrowserFamily::Brave
        } else if name.contains("edge") {
            BrowserFamily::Edge
        } else if name.contains("chromium") {
            BrowserFamily::Chromium
        } else if name.contains("chrome") {
            BrowserFamily::Chrome
        } else {
            BrowserFamily::Unknown
        }
    }

    /// Parse the `Browser` field of `/json/version`, e.g. `Chrome/129.0.6668.58`
    pub fn from_product(product: &str) -> Self {
        let product = product.to_lowercase();
        if product.starts_with("edg") {
            BrowserFamily::Edge
        } else if product.contains("chromium") {
            BrowserFamily::Chromium
        } else if product.contains("chrome") {
            BrowserFamily::Chrome
        } else {
            BrowserFamily::Unknown
        }
    }

    /// Name the running browser processes carry, which may differ from the launcher script
    pub fn process_name(self) -> Option<&'static str> {
        match self {
            BrowserFamily::Chrome => Some("chrome"),
            BrowserFamily::Chromium => Some("chromium"),
            BrowserFamily::Edge => Some("msedge"),
            BrowserFamily::Brave => Some("brave"),
            BrowserFamily::Unknown => None,
        }
    }
}

/// Everything needed to tear down a launched headless browser from another thread
///
/// Attached and visible sessions hand out an empty plan, since those browsers stay running.
#[derive(Debug, Clone, Default)]
pub struct EmergencyCleanup {
    pid: Option<u32>,
    temp_profile: Option<PathBuf>,
}

impl EmergencyCleanup {
    pub fn is_empty(&self) -> bool {
        self.pid.is_none() && self.temp_profile.is_none()
    }

    /// Kill the browser process and remove its temporary profile, ignoring failures
    pub fn run(&self) {
        if let Some(pid) = self.pid {
            if !crate::reaper::kill_pid(pid) {
                log::debug!("Browser process {} was already gone", pid);
            }
        }
        if let Some(dir) = &self.temp_profile {
            if let Err(e) = fs::remove_dir_all(dir) {
                log::debug!("Failed to remove temporary profile {}: {}", dir.display(), e);
            }
        }
    }
}

/// Connection to a single Chrome/Chromium instance for the duration of one invocation
///
/// Closing follows the session mode: only a launched headless browser is shut down
/// (together with the profile directory created for it). Closing happens at most once;
/// [`Drop`] closes a session that was not closed explicitly.
pub struct BrowserSession {
    /// `None` once the session is closed
    browser: Option<Browser>,

    mode: SessionMode,
    port: u16,
    executable_path: Option<PathBuf>,
    family: BrowserFamily,

    /// Profile created for a headless launch, removed on close
    temp_profile: Option<TempDir>,
}

impl BrowserSession {
    /// Attach to a running browser on the configured port, or launch one
    ///
    /// With `force_headless` the attach attempt is skipped. Launch-only options
    /// (profile directory, user agent) are ignored with a warning when attaching.
    pub fn connect(config: &SessionConfig) -> Result<Self> {
        if !config.force_headless {
            match Self::attach(&config.connection) {
                Ok(session) => {
                    warn_ignored_overrides(&config.launch);
                    return Ok(session);
                }
                Err(e) => log::debug!("Nothing to attach to on port {}: {}", config.port(), e),
            }
        }

        if config.launches_headless() {
            Self::launch_headless(&config.launch)
        } else {
            Self::launch_visible(&config.launch)
        }
    }

    /// Attach to a running browser, failing with [`BrowserError::NoBrowserRunning`] instead of launching
    pub fn attach_existing(options: &ConnectionOptions) -> Result<Self> {
        Self::attach(options).map_err(|e| {
            log::debug!("Attach to port {} failed: {}", options.port, e);
            BrowserError::NoBrowserRunning { port: options.port }
        })
    }

    fn attach(options: &ConnectionOptions) -> Result<Self> {
        let version = probe::fetch_version(options)?;
        let browser = connect_websocket(&version)?;

        log::info!("Attached to {} on port {}", version.browser, options.port);

        Ok(Self {
            browser: Some(browser),
            mode: SessionMode::Attached,
            port: options.port,
            executable_path: None,
            family: BrowserFamily::from_product(&version.browser),
            temp_profile: None,
        })
    }

    /// Launch a headless browser owned by this session
    pub fn launch_headless(options: &LaunchOptions) -> Result<Self> {
        let executable = discover_executable(options.chrome_path.as_deref())?;

        let (temp_profile, user_data_dir) = headless_profile(options.user_data_dir.as_deref())?;

        let user_agent_arg = options
            .user_agent
            .as_ref()
            .map(|ua| OsString::from(format!("--user-agent={}", ua)));

        let mut launch_opts = headless_chrome::LaunchOptions::default();

        // Ignore default arguments to prevent detection by anti-bot services
        launch_opts.ignore_default_args.push(OsStr::new("--enable-automation"));
        launch_opts.args.push(OsStr::new("--disable-blink-features=AutomationControlled"));
        if let Some(arg) = &user_agent_arg {
            launch_opts.args.push(arg.as_os_str());
        }

        launch_opts.idle_browser_timeout = IDLE_TIMEOUT;
        launch_opts.headless = true;
        launch_opts.window_size = Some((options.window_width, options.window_height));
        launch_opts.path = Some(executable.clone());
        launch_opts.user_data_dir = Some(user_data_dir);
        launch_opts.sandbox = options.sandbox;
        launch_opts.port = Some(options.port);

        log::info!("Launching headless browser {} on port {}", executable.display(), options.port);
        let browser = Browser::new(launch_opts).map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        Ok(Self {
            browser: Some(browser),
            mode: SessionMode::LaunchedHeadless,
            port: options.port,
            family: BrowserFamily::from_executable(&executable),
            executable_path: Some(executable),
            temp_profile,
        })
    }

    /// Launch a visible browser as a detached process, then attach to it
    ///
    /// The process is not tied to this session, so it keeps running after close.
    pub fn launch_visible(options: &LaunchOptions) -> Result<Self> {
        let executable = discover_executable(options.chrome_path.as_deref())?;

        let user_data_dir = options
            .user_data_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(format!("snag-profile-{}", options.port)));
        fs::create_dir_all(&user_data_dir)?;

        let mut command = Command::new(&executable);
        command
            .arg(format!("{}={}", DEBUG_PORT_MARKER, options.port))
            .arg(format!("--user-data-dir={}", user_data_dir.display()))
            .arg(format!("--window-size={},{}", options.window_width, options.window_height))
            .arg("--no-first-run")
            .arg("--no-default-browser-check");
        if let Some(ua) = &options.user_agent {
            command.arg(format!("--user-agent={}", ua));
        }
        if !options.sandbox {
            command.arg("--no-sandbox");
        }

        log::info!("Launching visible browser {} on port {}", executable.display(), options.port);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| BrowserError::LaunchFailed(format!("{}: {}", executable.display(), e)))?;

        let connection = ConnectionOptions::new(options.port);
        let version = wait_for_endpoint(&connection, options.launch_timeout)?;
        let browser = connect_websocket(&version)?;

        Ok(Self {
            browser: Some(browser),
            mode: SessionMode::LaunchedVisible,
            port: options.port,
            family: BrowserFamily::from_executable(&executable),
            executable_path: Some(executable),
            temp_profile: None,
        })
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn executable_path(&self) -> Option<&Path> {
        self.executable_path.as_deref()
    }

    pub fn family(&self) -> BrowserFamily {
        self.family
    }

    pub fn is_closed(&self) -> bool {
        self.browser.is_none()
    }

    /// Get the underlying Browser instance
    pub fn browser(&self) -> Result<&Browser> {
        self.browser
            .as_ref()
            .ok_or_else(|| BrowserError::TabOperationFailed("browser session is closed".to_string()))
    }

    /// Plan for tearing this session down from an interrupt handler
    pub fn emergency_cleanup(&self) -> EmergencyCleanup {
        if self.mode != SessionMode::LaunchedHeadless {
            return EmergencyCleanup::default();
        }
        EmergencyCleanup {
            pid: self.browser.as_ref().and_then(|b| b.get_process_id()),
            temp_profile: self.temp_profile.as_ref().map(|dir| dir.path().to_path_buf()),
        }
    }

    /// Get all page tabs known to the connection
    pub fn get_tabs(&self) -> Result<Vec<Arc<Tab>>> {
        let tabs = self
            .browser()?
            .get_tabs()
            .lock()
            .map_err(|e| BrowserError::TabOperationFailed(format!("Failed to get tabs: {}", e)))?
            .clone();

        Ok(tabs)
    }

    /// Wait until the set of discovered tabs stops changing
    ///
    /// Targets of an attached browser are reported asynchronously after connecting.
    fn settle_tabs(&self) -> Result<()> {
        const POLL: Duration = Duration::from_millis(100);
        const STABLE_POLLS: u32 = 3;
        let deadline = Instant::now() + Duration::from_secs(2);

        let mut last = self.get_tabs()?.len();
        let mut stable = 0;
        while stable < STABLE_POLLS && Instant::now() < deadline {
            thread::sleep(POLL);
            let count = self.get_tabs()?.len();
            if count == last {
                stable += 1;
            } else {
                last = count;
                stable = 0;
            }
        }
        Ok(())
    }

    /// List open tabs in deterministic order
    pub fn enumerate_tabs(&self) -> Result<TabCatalog> {
        self.settle_tabs()?;
        let tabs = self.get_tabs()?;

        let catalog = TabCatalog::from_pages(tabs.iter().map(|tab| {
            tab.get_target_info()
                .map(|info| PageMetadata::new(info.url, info.title, info.target_id))
                .map_err(|e| format!("{}: {}", tab.get_target_id(), e))
        }));

        // Every read failing usually means the browser itself went away
        if catalog.is_empty() && catalog.skipped() > 0 && probe::fetch_version(&ConnectionOptions::new(self.port)).is_err() {
            return Err(BrowserError::NoBrowserRunning { port: self.port });
        }

        log::debug!("Enumerated {} tab(s), {} unreadable", catalog.len(), catalog.skipped());
        Ok(catalog)
    }

    /// Find an open tab by its target id
    pub fn tab_by_target_id(&self, target_id: &str) -> Result<Arc<Tab>> {
        self.get_tabs()?
            .into_iter()
            .find(|tab| tab.get_target_id() == target_id)
            .ok_or_else(|| BrowserError::TabOperationFailed(format!("Tab {} is no longer open", target_id)))
    }

    /// Open `url` in a new tab and wait for navigation to finish
    pub fn open_url(&self, url: &str, page_timeout: Duration) -> Result<Arc<Tab>> {
        let tab = self
            .browser()?
            .new_tab()
            .map_err(|e| BrowserError::TabOperationFailed(format!("Failed to create tab: {}", e)))?;
        tab.set_default_timeout(page_timeout);

        tab.navigate_to(url)
            .map_err(|e| BrowserError::NavigationFailed(format!("Failed to navigate to {}: {}", url, e)))?;
        tab.wait_until_navigated()
            .map_err(|e| BrowserError::NavigationFailed(format!("Navigation to {} did not complete: {}", url, e)))?;

        Ok(tab)
    }

    /// Release the browser according to the session mode
    ///
    /// Safe to call more than once; only the first call has any effect.
    pub fn close(&mut self) -> Result<()> {
        let browser = self.browser.take();
        let temp_profile = self.temp_profile.take();
        if browser.is_none() && temp_profile.is_none() {
            return Ok(());
        }

        match self.mode {
            SessionMode::Attached | SessionMode::LaunchedVisible => {
                log::debug!("Leaving browser on port {} running", self.port);
                // Dropping a connected Browser only closes the websocket
                drop(browser);
            }
            SessionMode::LaunchedHeadless => {
                log::debug!("Shutting down headless browser on port {}", self.port);
                // headless_chrome kills and reaps the process it launched on drop
                drop(browser);
                if let Some(dir) = temp_profile {
                    let path = dir.path().to_path_buf();
                    if let Err(e) = dir.close() {
                        log::warn!("Failed to remove temporary profile {}: {}", path.display(), e);
                    }
                }
            }
        }

        Ok(())
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Profile directory for a headless launch
///
/// An explicit directory is used as-is and never owned by the session; otherwise a
/// temporary one is created and returned for removal on close.
fn headless_profile(user_data_dir: Option<&Path>) -> Result<(Option<TempDir>, PathBuf)> {
    match user_data_dir {
        Some(dir) => Ok((None, dir.to_path_buf())),
        None => {
            let temp = tempfile::Builder::new().prefix("snag-profile-").tempdir()?;
            let path = temp.path().to_path_buf();
            Ok((Some(temp), path))
        }
    }
}

/// Find the browser executable to launch
pub fn discover_executable(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) if path.exists() => Ok(path.to_path_buf()),
        Some(path) => Err(BrowserError::BrowserNotFound(format!("{} does not exist", path.display()))),
        None => headless_chrome::browser::default_executable().map_err(BrowserError::BrowserNotFound),
    }
}

fn connect_websocket(version: &VersionInfo) -> Result<Browser> {
    Browser::connect_with_timeout(version.web_socket_debugger_url.clone(), IDLE_TIMEOUT)
        .map_err(|e| BrowserError::ConnectionFailed(e.to_string()))
}

fn wait_for_endpoint(options: &ConnectionOptions, timeout: Duration) -> Result<VersionInfo> {
    let deadline = Instant::now() + timeout;
    loop {
        match probe::fetch_version(options) {
            Ok(version) => return Ok(version),
            Err(e) if Instant::now() >= deadline => {
                return Err(BrowserError::ConnectionFailed(format!(
                    "browser did not open port {} within {:?}: {}",
                    options.port, timeout, e
                )));
            }
            Err(_) => thread::sleep(Duration::from_millis(250)),
        }
    }
}

fn warn_ignored_overrides(options: &LaunchOptions) {
    if let Some(dir) = &options.user_data_dir {
        log::warn!("Ignoring user data dir {} because an existing browser was attached", dir.display());
    }
    if options.user_agent.is_some() {
        log::warn!("Ignoring user agent override because an existing browser was attached");
    }
}
