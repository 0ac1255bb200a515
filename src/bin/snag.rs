//! snag command-line interface
//!
//! Fetches page content from a Chrome/Chromium browser over the DevTools Protocol. Logs go to
//! stderr, page content to stdout or files.

use anyhow::{Context, bail};
use clap::{ArgGroup, Parser};
use snag::browser::{DEFAULT_PORT, LaunchOptions, SessionConfig};
use snag::operations::{self, FetchOptions, Invocation, TabSelection};
use snag::{Format, SessionMode, utils};
use std::{path::PathBuf, process, time::Duration};

#[derive(Parser)]
#[command(name = "snag")]
#[command(version)]
#[command(about = "Fetch rendered page content from Chrome/Chromium via CDP", long_about = None)]
#[command(group(
    ArgGroup::new("operation")
        .args(["list_tabs", "tab", "all_tabs", "open_browser", "kill_browser", "doctor"])
        .multiple(false)
))]
struct Cli {
    /// URLs to fetch (a scheme is added when missing)
    #[arg(value_name = "URL")]
    urls: Vec<String>,

    /// Read URLs from a file, one per line
    #[arg(long, value_name = "FILE")]
    url_file: Option<PathBuf>,

    /// List the tabs of the running browser
    #[arg(long, short = 'l')]
    list_tabs: bool,

    /// Fetch open tabs by index, range (2-4), URL, substring or regex
    #[arg(long, short = 't', value_name = "PATTERN")]
    tab: Option<String>,

    /// Fetch every open tab
    #[arg(long, short = 'a')]
    all_tabs: bool,

    /// Start a visible browser (opening any given URLs) and leave it running
    #[arg(long)]
    open_browser: bool,

    /// Kill the browser on --port, or every browser with remote debugging enabled
    #[arg(long)]
    kill_browser: bool,

    /// Print browser and port diagnostics
    #[arg(long)]
    doctor: bool,

    /// Remote-debugging port (default: 9222)
    #[arg(long, short = 'p')]
    port: Option<u16>,

    /// Always launch a fresh headless browser, never attach
    #[arg(long)]
    force_headless: bool,

    /// Path to the browser executable
    #[arg(long, value_name = "PATH")]
    chrome_path: Option<PathBuf>,

    /// User agent for a launched browser
    #[arg(long, value_name = "UA")]
    user_agent: Option<String>,

    /// Profile directory for a launched browser
    #[arg(long, value_name = "DIR")]
    user_data_dir: Option<PathBuf>,

    /// CSS selector to wait for before capturing
    #[arg(long, short = 'w', value_name = "SELECTOR")]
    wait_for: Option<String>,

    /// Page load and wait timeout in seconds
    #[arg(long, default_value_t = 30, value_name = "SECONDS")]
    timeout: u64,

    /// Output file (single target only)
    #[arg(long, short = 'o', value_name = "FILE")]
    output: Option<PathBuf>,

    /// Directory for generated filenames
    #[arg(long, short = 'd', value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Output format: md, html, text, pdf or png
    #[arg(long, short = 'f', default_value = "md")]
    format: Format,

    /// Close tabs after fetching them
    #[arg(long)]
    close_tab: bool,

    /// Debug logging
    #[arg(long, short = 'v', conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors
    #[arg(long, short = 'q')]
    quiet: bool,
}

impl Cli {
    fn session_config(&self) -> SessionConfig {
        let port = self.port.unwrap_or(DEFAULT_PORT);
        let mut launch = LaunchOptions::new().port(port);
        if let Some(path) = &self.chrome_path {
            launch = launch.chrome_path(path);
        }
        if let Some(dir) = &self.user_data_dir {
            launch = launch.user_data_dir(dir);
        }
        if let Some(user_agent) = &self.user_agent {
            launch = launch.user_agent(user_agent);
        }

        SessionConfig::new(port).launch(launch).force_headless(self.force_headless)
    }

    fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            format: self.format,
            output: self.output.clone(),
            output_dir: self.output_dir.clone(),
            wait_for: self.wait_for.clone(),
            wait_timeout: self.timeout(),
            page_timeout: self.timeout(),
            close_tab: self.close_tab,
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    fn collect_urls(&self) -> anyhow::Result<Vec<String>> {
        let mut urls = self.urls.clone();
        if let Some(path) = &self.url_file {
            urls.extend(utils::load_url_file(path)?);
        }
        Ok(urls)
    }
}

fn init_logging(cli: &Cli) {
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn run(cli: Cli, invocation: &Invocation) -> anyhow::Result<()> {
    let config = cli.session_config();

    if cli.doctor {
        print!("{}", operations::doctor(&config));
        return Ok(());
    }

    if cli.kill_browser {
        let killed = operations::kill_browser(cli.port, cli.chrome_path.as_deref())?;
        if killed == 0 {
            log::info!("No browser to kill");
        }
        return Ok(());
    }

    if cli.list_tabs {
        let catalog = operations::list_tabs(invocation, &config.connection)?;
        if catalog.is_empty() {
            log::info!("No tabs open");
        } else {
            print!("{}", catalog);
        }
        return Ok(());
    }

    let urls = cli.collect_urls()?;

    if cli.open_browser {
        let mode = operations::open_browser(invocation, &config, &urls, cli.timeout())?;
        if mode == SessionMode::LaunchedVisible {
            log::info!("Browser started on port {}", config.port());
        }
        return Ok(());
    }

    let options = cli.fetch_options();
    let selection = match (&cli.tab, cli.all_tabs) {
        (Some(pattern), _) => Some(TabSelection::Pattern(pattern.clone())),
        (None, true) => Some(TabSelection::All),
        (None, false) => None,
    };

    match selection {
        Some(_) if !urls.is_empty() => bail!("URLs cannot be combined with --tab or --all-tabs"),
        Some(selection) => operations::fetch_tabs(invocation, &config.connection, &selection, &options)?,
        None if urls.is_empty() => bail!("nothing to fetch: give a URL, --url-file, --tab, --all-tabs or --list-tabs"),
        None => operations::fetch_urls(invocation, &config, &urls, &options)?,
    }

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let invocation = Invocation::new();
    let worker = {
        let invocation = invocation.clone();
        tokio::task::spawn_blocking(move || run(cli, &invocation))
    };

    tokio::select! {
        joined = worker => joined.context("operation aborted")?,
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for interrupt")?;
            log::warn!("Interrupted");
            invocation.interrupt();
            process::exit(130);
        }
    }
}
