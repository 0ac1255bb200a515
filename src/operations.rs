//! Top-level operations, one per invocation
//!
//! Each operation owns the single [`BrowserSession`] of the invocation and closes it on every
//! return path. The [`Invocation`] context carries the session's emergency cleanup so an
//! interrupt handler running elsewhere can tear down a launched headless browser.

use crate::{batch::{BatchExecutor, BatchItem, BatchOptions, BatchReport, PageOpener},
            browser::{self, probe, BrowserFamily, BrowserSession, ConnectionOptions, EmergencyCleanup, PortStatus,
                      SessionConfig, SessionMode},
            convert::{ChromeConverter, ContentConverter, PageSource},
            error::{BrowserError, Result},
            filename::{generate_base_name, resolve_conflict},
            format::Format,
            reaper,
            tabs::{TabCatalog, TabResolver},
            utils::normalize_url};
use chrono::Local;
use headless_chrome::Tab;
use std::{fmt, fs,
          io::{self, Write},
          path::{Path, PathBuf},
          sync::{Arc, Mutex},
          time::Duration};

/// Request-scoped state shared between the running operation and the interrupt handler
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    cleanup: Arc<Mutex<Option<EmergencyCleanup>>>,
}

impl Invocation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` against `session`, then close the session whatever `f` returned
    fn with_session<T>(&self, mut session: BrowserSession, f: impl FnOnce(&BrowserSession) -> Result<T>) -> Result<T> {
        self.set_cleanup(Some(session.emergency_cleanup()));
        let result = f(&session);
        let closed = session.close();
        self.set_cleanup(None);

        match (result, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Err(close_err)) => {
                log::warn!("Failed to close browser session: {}", close_err);
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
        }
    }

    fn set_cleanup(&self, plan: Option<EmergencyCleanup>) {
        if let Ok(mut slot) = self.cleanup.lock() {
            *slot = plan;
        }
    }

    /// Best-effort teardown of the live session; called when the process is interrupted
    pub fn interrupt(&self) {
        let plan = self.cleanup.lock().ok().and_then(|mut slot| slot.take());
        if let Some(plan) = plan {
            log::debug!("Interrupted, cleaning up browser session");
            plan.run();
        }
    }
}

/// How fetched content is waited for and where it is written
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub format: Format,

    /// Exact output file, only valid for a single target
    pub output: Option<PathBuf>,

    /// Directory for generated filenames
    pub output_dir: Option<PathBuf>,

    /// CSS selector to wait for before converting
    pub wait_for: Option<String>,
    pub wait_timeout: Duration,

    /// Navigation timeout for URLs opened in new tabs
    pub page_timeout: Duration,

    /// Close tabs after fetching them
    pub close_tab: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            format: Format::default(),
            output: None,
            output_dir: None,
            wait_for: None,
            wait_timeout: Duration::from_secs(30),
            page_timeout: Duration::from_secs(30),
            close_tab: false,
        }
    }
}

impl FetchOptions {
    fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            format: self.format,
            output_dir: self.output_dir.clone().unwrap_or_else(|| PathBuf::from(".")),
            wait_for: self.wait_for.clone(),
            wait_timeout: self.wait_timeout,
        }
    }

    fn check_target_count(&self, count: usize) -> Result<()> {
        if count > 1 && self.output.is_some() {
            return Err(BrowserError::InvalidInput(
                "an output file can only be used with a single target; use an output directory instead".to_string(),
            ));
        }
        Ok(())
    }
}

/// Which open tabs to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabSelection {
    /// Index, range, URL, substring or regex
    Pattern(String),
    All,
}

/// Opens batch items as tabs of a live session
pub struct SessionPages<'a> {
    session: &'a BrowserSession,
    page_timeout: Duration,
    close_tabs: bool,
}

impl<'a> SessionPages<'a> {
    pub fn new(session: &'a BrowserSession, options: &FetchOptions) -> Self {
        Self { session, page_timeout: options.page_timeout, close_tabs: options.close_tab }
    }
}

impl PageOpener for SessionPages<'_> {
    type Page = Arc<Tab>;

    fn open(&mut self, item: &BatchItem) -> Result<Arc<Tab>> {
        match item {
            BatchItem::Tab(tab) => self.session.tab_by_target_id(&tab.target_id),
            BatchItem::Url(url) => self.session.open_url(url, self.page_timeout),
        }
    }

    fn release(&mut self, item: &BatchItem, tab: Arc<Tab>) {
        // Tabs we opened ourselves are closed unless the user is looking at the browser
        let close = match item {
            BatchItem::Url(_) => self.close_tabs || self.session.mode() != SessionMode::LaunchedVisible,
            BatchItem::Tab(_) => self.close_tabs,
        };
        if close {
            if let Err(e) = tab.close(false) {
                log::debug!("Failed to close tab for {}: {}", item, e);
            }
        }
    }
}

/// Fetch one or more URLs, attaching to a running browser or launching one
pub fn fetch_urls(invocation: &Invocation, config: &SessionConfig, urls: &[String], options: &FetchOptions) -> Result<()> {
    if urls.is_empty() {
        return Err(BrowserError::InvalidInput("no URLs given".to_string()));
    }
    options.check_target_count(urls.len())?;

    let items: Vec<BatchItem> = urls.iter().map(|url| BatchItem::Url(normalize_url(url))).collect();
    let session = BrowserSession::connect(config)?;

    invocation.with_session(session, |session| {
        if items.len() == 1 {
            fetch_single(session, &items[0], options)
        } else {
            run_batch(session, items, options).map(|_| ())
        }
    })
}

/// Fetch tabs of an already-running browser
///
/// A pattern matching a single tab behaves like a single fetch (stdout or one file);
/// anything else is processed as a batch.
pub fn fetch_tabs(
    invocation: &Invocation,
    connection: &ConnectionOptions,
    selection: &TabSelection,
    options: &FetchOptions,
) -> Result<()> {
    if *selection == TabSelection::All && options.output.is_some() {
        return Err(BrowserError::InvalidInput(
            "an output file cannot be used with all tabs; use an output directory instead".to_string(),
        ));
    }

    let session = BrowserSession::attach_existing(connection)?;

    invocation.with_session(session, |session| {
        let catalog = session.enumerate_tabs()?;
        let tabs = match selection {
            TabSelection::All if catalog.is_empty() => {
                return Err(BrowserError::TabOperationFailed("no tabs are open".to_string()));
            }
            TabSelection::All => catalog.tabs().to_vec(),
            TabSelection::Pattern(pattern) => match TabResolver::new(&catalog).resolve(pattern) {
                Ok(matched) => matched.tabs,
                Err(e) => {
                    if e.shows_catalog() {
                        eprint!("{}", catalog);
                    }
                    return Err(e);
                }
            },
        };

        let items: Vec<BatchItem> = tabs.into_iter().map(BatchItem::Tab).collect();
        if items.len() == 1 && matches!(selection, TabSelection::Pattern(_)) {
            return fetch_single(session, &items[0], options);
        }

        options.check_target_count(items.len())?;
        run_batch(session, items, options).map(|_| ())
    })
}

/// List the tabs of an already-running browser
pub fn list_tabs(invocation: &Invocation, connection: &ConnectionOptions) -> Result<TabCatalog> {
    let session = BrowserSession::attach_existing(connection)?;
    invocation.with_session(session, |session| session.enumerate_tabs())
}

/// Start (or reuse) a visible browser, optionally opening URLs in it, and leave it running
pub fn open_browser(invocation: &Invocation, config: &SessionConfig, urls: &[String], page_timeout: Duration) -> Result<SessionMode> {
    if config.force_headless {
        return Err(BrowserError::InvalidInput("cannot open a visible browser in forced headless mode".to_string()));
    }

    let config = config.clone().open_visible(true);
    let session = BrowserSession::connect(&config)?;

    invocation.with_session(session, |session| {
        if session.mode() == SessionMode::Attached {
            log::info!("Browser already running on port {}", session.port());
        }
        for url in urls {
            let url = normalize_url(url);
            session.open_url(&url, page_timeout)?;
            log::info!("Opened {}", url);
        }
        Ok(session.mode())
    })
}

/// Kill the browser on `port`, or every debug-enabled instance of the managed browser
pub fn kill_browser(port: Option<u16>, chrome_path: Option<&Path>) -> Result<usize> {
    match port {
        Some(port) => reaper::kill_on_port(port),
        None => {
            let executable = browser::discover_executable(chrome_path)?;
            reaper::kill_all_managed(&executable)
        }
    }
}

fn fetch_single(session: &BrowserSession, item: &BatchItem, options: &FetchOptions) -> Result<()> {
    let mut pages = SessionPages::new(session, options);
    let tab = pages.open(item)?;
    let result = write_single(&tab, &ChromeConverter, options);
    pages.release(item, tab);
    result.map(|_| ())
}

fn run_batch(session: &BrowserSession, items: Vec<BatchItem>, options: &FetchOptions) -> Result<BatchReport> {
    let batch_options = options.batch_options();
    let mut pages = SessionPages::new(session, options);
    BatchExecutor::new(&batch_options, &ChromeConverter)
        .execute(items, &mut pages)
        .into_result()
}

/// Convert one page and write it to the output file, a generated file, or stdout
///
/// Text formats go to stdout unless a file or directory was requested; binary formats
/// always get a file. Returns the path written, if any.
pub fn write_single<P, C>(page: &P, converter: &C, options: &FetchOptions) -> Result<Option<PathBuf>>
where
    P: PageSource,
    C: ContentConverter<P>,
{
    if let Some(selector) = &options.wait_for {
        page.wait_for(selector, options.wait_timeout)?;
    }

    let target = match (&options.output, &options.output_dir) {
        (Some(path), _) => Some(path.clone()),
        (None, dir) if dir.is_some() || options.format.is_binary() => {
            let dir = dir.clone().unwrap_or_else(|| PathBuf::from("."));
            let name = generate_base_name(&page.title(), &page.url(), &Local::now(), options.format);
            fs::create_dir_all(&dir)?;
            Some(resolve_conflict(&dir, &name)?)
        }
        (None, _) => None,
    };

    let content = converter.convert(page, options.format)?;

    match target {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, &content)?;
            log::info!("Saved {}", path.display());
            Ok(Some(path))
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(&content)?;
            stdout.flush()?;
            Ok(None)
        }
    }
}

/// Environment diagnostics
#[derive(Debug)]
pub struct DoctorReport {
    pub executable: Result<PathBuf>,
    pub family: Option<BrowserFamily>,
    pub version: Option<String>,
    pub port: u16,
    pub status: PortStatus,
    pub tab_count: Option<usize>,
}

/// Check browser discovery and whether something answers on the debugging port
pub fn doctor(config: &SessionConfig) -> DoctorReport {
    let executable = browser::discover_executable(config.launch.chrome_path.as_deref());
    let family = executable.as_ref().ok().map(|path| BrowserFamily::from_executable(path));
    let version = executable.as_ref().ok().and_then(|path| probe::executable_version(path));

    let port = config.port();
    let status = probe::probe_port(port);
    let tab_count = if status.is_running() {
        let connection = config.connection.clone();
        probe::first_to_finish(probe::VERSION_PROBE_TIMEOUT, move || {
            BrowserSession::attach_existing(&connection)
                .and_then(|session| session.enumerate_tabs())
                .map(|catalog| catalog.len())
        })
        .and_then(|count| count.ok())
    } else {
        None
    };

    DoctorReport { executable, family, version, port, status, tab_count }
}

impl fmt::Display for DoctorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.executable {
            Ok(path) => writeln!(f, "Browser executable: {}", path.display())?,
            Err(e) => writeln!(f, "Browser executable: not found ({})", e)?,
        }
        if let Some(family) = self.family {
            writeln!(f, "Browser family:     {:?}", family)?;
        }
        writeln!(f, "Browser version:    {}", self.version.as_deref().unwrap_or("unknown"))?;

        match &self.status {
            PortStatus::Running(info) => {
                writeln!(f, "Port {}:         running ({})", self.port, info.browser)?;
                if let Some(count) = self.tab_count {
                    writeln!(f, "Open tabs:          {}", count)?;
                }
            }
            PortStatus::NotRunning => writeln!(f, "Port {}:         not running", self.port)?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct StaticPage;

    impl PageSource for StaticPage {
        fn url(&self) -> String {
            "https://example.com/docs".to_string()
        }

        fn title(&self) -> String {
            "Example Docs".to_string()
        }

        fn wait_for(&self, _selector: &str, _timeout: Duration) -> Result<()> {
            Ok(())
        }
    }

    struct EchoConverter;

    impl ContentConverter<StaticPage> for EchoConverter {
        fn convert(&self, page: &StaticPage, format: Format) -> Result<Vec<u8>> {
            Ok(format!("{} {}", page.title(), format).into_bytes())
        }
    }

    #[test]
    fn test_write_single_to_explicit_file() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("nested").join("page.md");
        let options = FetchOptions { output: Some(output.clone()), ..Default::default() };

        let written = write_single(&StaticPage, &EchoConverter, &options).unwrap();

        assert_eq!(written, Some(output.clone()));
        assert_eq!(fs::read_to_string(output).unwrap(), "Example Docs markdown");
    }

    #[test]
    fn test_write_single_binary_gets_generated_name() {
        let dir = TempDir::new().unwrap();
        let options = FetchOptions {
            format: Format::Pdf,
            output_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };

        let path = write_single(&StaticPage, &EchoConverter, &options).unwrap().unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();

        assert!(name.ends_with("-example-docs.pdf"), "{}", name);
        assert_eq!(path.parent().unwrap(), dir.path());
    }

    #[test]
    fn test_output_file_rejects_multiple_targets() {
        let options = FetchOptions { output: Some(PathBuf::from("out.md")), ..Default::default() };
        assert!(options.check_target_count(1).is_ok());
        assert!(matches!(options.check_target_count(2), Err(BrowserError::InvalidInput(_))));
    }

    #[test]
    fn test_all_tabs_rejects_output_file() {
        let options = FetchOptions { output: Some(PathBuf::from("page.md")), ..Default::default() };
        // Rejected before any browser is contacted
        let err = fetch_tabs(&Invocation::new(), &ConnectionOptions::new(1), &TabSelection::All, &options).unwrap_err();
        assert!(matches!(err, BrowserError::InvalidInput(_)));
    }

    #[test]
    fn test_fetch_urls_requires_urls() {
        let err = fetch_urls(&Invocation::new(), &SessionConfig::default(), &[], &FetchOptions::default()).unwrap_err();
        assert!(matches!(err, BrowserError::InvalidInput(_)));
    }

    #[test]
    fn test_open_browser_rejects_forced_headless() {
        let config = SessionConfig::default().force_headless(true);
        let err = open_browser(&Invocation::new(), &config, &[], Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, BrowserError::InvalidInput(_)));
    }

    #[test]
    fn test_interrupt_without_session_is_noop() {
        Invocation::new().interrupt();
    }
}
