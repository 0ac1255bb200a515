use snag::batch::{BatchExecutor, BatchItem, BatchOptions};
use snag::browser::probe;
use snag::operations::{self, FetchOptions, SessionPages};
use snag::{BrowserError, BrowserSession, ChromeConverter, ConnectionOptions, Format, LaunchOptions, SessionMode,
           TabResolver};
use std::net::TcpListener;
use std::time::Duration;
use tempfile::TempDir;

fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn headless(port: u16) -> BrowserSession {
    BrowserSession::launch_headless(&LaunchOptions::new().sandbox(false).port(port))
        .expect("Failed to launch browser")
}

const PAGE: &str = "data:text/html,<html><head><title>Snag Test</title></head><body><h1>Hello</h1><p id='ready'>world</p></body></html>";

#[test]
fn test_attach_without_browser_reports_port() {
    let port = free_port();
    match BrowserSession::attach_existing(&ConnectionOptions::new(port)) {
        Err(BrowserError::NoBrowserRunning { port: reported }) => assert_eq!(reported, port),
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("attached to a free port"),
    }
}

#[test]
fn test_probe_free_port_not_running() {
    assert!(!probe::probe_port(free_port()).is_running());
}

#[test]
#[ignore] // Requires Chrome to be installed
fn test_headless_launch_and_close() {
    let port = free_port();
    let mut session = headless(port);
    assert_eq!(session.mode(), SessionMode::LaunchedHeadless);
    assert!(!session.emergency_cleanup().is_empty());
    assert!(probe::probe_port(port).is_running());

    session.close().expect("Failed to close session");
    session.close().expect("Second close should be a no-op");
    assert!(session.is_closed());
}

#[test]
#[ignore]
fn test_enumerate_and_resolve_tabs() {
    let session = headless(free_port());
    session.open_url(PAGE, Duration::from_secs(30)).expect("Failed to open page");

    let catalog = session.enumerate_tabs().expect("Failed to enumerate tabs");
    assert!(!catalog.is_empty());
    for (position, tab) in catalog.iter().enumerate() {
        assert_eq!(tab.index, position + 1);
    }

    let matched = TabResolver::new(&catalog).resolve("snag test").expect("Failed to resolve by title");
    assert_eq!(matched.tabs.len(), 1);
    assert!(session.tab_by_target_id(&matched.tabs[0].target_id).is_ok());
}

#[test]
#[ignore]
fn test_convert_open_page() {
    let session = headless(free_port());
    let tab = session.open_url(PAGE, Duration::from_secs(30)).expect("Failed to open page");
    let dir = TempDir::new().unwrap();

    let options = FetchOptions {
        output_dir: Some(dir.path().to_path_buf()),
        wait_for: Some("#ready".to_string()),
        ..Default::default()
    };
    let path = operations::write_single(&tab, &ChromeConverter, &options)
        .expect("Failed to write page")
        .expect("Expected a file to be written");

    let markdown = std::fs::read_to_string(&path).unwrap();
    assert!(markdown.contains("Hello"));
    assert!(path.to_string_lossy().ends_with("-snag-test.md"));
}

#[test]
#[ignore]
fn test_batch_over_urls() {
    let session = headless(free_port());
    let dir = TempDir::new().unwrap();

    let fetch = FetchOptions::default();
    let batch = BatchOptions {
        format: Format::Html,
        output_dir: dir.path().to_path_buf(),
        ..Default::default()
    };
    let mut pages = SessionPages::new(&session, &fetch);
    let items = vec![BatchItem::Url(PAGE.to_string()), BatchItem::Url(PAGE.to_string())];

    let report = BatchExecutor::new(&batch, &ChromeConverter).execute(items, &mut pages);

    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.written().count(), 2);
    let names: Vec<_> = report.written().collect();
    assert_ne!(names[0], names[1]);
}
