//! Sequential processing of many tabs or URLs with continue-on-error semantics
//!
//! Every item in a batch shares one timestamp, so all generated filenames belong to the
//! same naming epoch. A failing item is logged and counted; it never stops the batch and
//! never undoes files already written.

use crate::{convert::{ContentConverter, PageSource},
            error::{BrowserError, Result},
            filename::{generate_base_name, resolve_conflict},
            format::Format,
            tabs::TabDescriptor};
use chrono::{DateTime, Local, TimeZone};
use std::{fmt, fs, path::PathBuf, time::Duration};

/// One target of a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchItem {
    /// A tab that is already open
    Tab(TabDescriptor),
    /// A URL to open in a fresh tab
    Url(String),
}

impl fmt::Display for BatchItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchItem::Tab(tab) => write!(f, "tab [{}] {}", tab.index, tab.url),
            BatchItem::Url(url) => f.write_str(url),
        }
    }
}

/// Turns batch items into pages and gives them back afterwards
pub trait PageOpener {
    type Page;

    fn open(&mut self, item: &BatchItem) -> Result<Self::Page>;

    /// Called after an item was processed, whether or not it succeeded
    fn release(&mut self, _item: &BatchItem, _page: Self::Page) {}
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub format: Format,
    pub output_dir: PathBuf,

    /// CSS selector to wait for before converting each page
    pub wait_for: Option<String>,
    pub wait_timeout: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            format: Format::default(),
            output_dir: PathBuf::from("."),
            wait_for: None,
            wait_timeout: Duration::from_secs(30),
        }
    }
}

/// What happened to a single item
#[derive(Debug)]
pub struct BatchOutcome {
    pub item: BatchItem,
    pub result: Result<PathBuf>,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<BatchOutcome>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }

    /// Paths written, in batch order
    pub fn written(&self) -> impl Iterator<Item = &PathBuf> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }

    /// `Err(BatchFailed)` when at least one item failed
    pub fn into_result(self) -> Result<Self> {
        if self.failed() > 0 {
            return Err(BrowserError::BatchFailed { succeeded: self.succeeded(), failed: self.failed() });
        }
        Ok(self)
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} succeeded, {} failed", self.succeeded(), self.failed())
    }
}

pub struct BatchExecutor<'a, C> {
    options: &'a BatchOptions,
    converter: &'a C,
}

impl<'a, C> BatchExecutor<'a, C> {
    pub fn new(options: &'a BatchOptions, converter: &'a C) -> Self {
        Self { options, converter }
    }

    /// Process `items` in the given order, timestamping the batch with the current local time
    pub fn execute<O>(&self, items: Vec<BatchItem>, opener: &mut O) -> BatchReport
    where
        O: PageOpener,
        O::Page: PageSource,
        C: ContentConverter<O::Page>,
    {
        self.execute_at(items, opener, &Local::now())
    }

    /// Process `items` in the given order under a fixed batch timestamp
    pub fn execute_at<O, Tz>(&self, items: Vec<BatchItem>, opener: &mut O, timestamp: &DateTime<Tz>) -> BatchReport
    where
        O: PageOpener,
        O::Page: PageSource,
        C: ContentConverter<O::Page>,
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        let total = items.len();
        let mut outcomes = Vec::with_capacity(total);

        for (i, item) in items.into_iter().enumerate() {
            let progress = format!("[{}/{}]", i + 1, total);
            log::info!("{} Fetching {}", progress, item);

            let result = self.process(&item, opener, timestamp);
            match &result {
                Ok(path) => log::info!("{} Saved {}", progress, path.display()),
                Err(e) => log::error!("{} Failed {}: {}", progress, item, e),
            }
            outcomes.push(BatchOutcome { item, result });
        }

        let report = BatchReport { outcomes };
        // The summary is printed whatever the log level
        eprintln!("{}", report);
        report
    }

    fn process<O, Tz>(&self, item: &BatchItem, opener: &mut O, timestamp: &DateTime<Tz>) -> Result<PathBuf>
    where
        O: PageOpener,
        O::Page: PageSource,
        C: ContentConverter<O::Page>,
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        let page = opener.open(item)?;
        let result = self.save_page(&page, timestamp);
        opener.release(item, page);
        result
    }

    fn save_page<P, Tz>(&self, page: &P, timestamp: &DateTime<Tz>) -> Result<PathBuf>
    where
        P: PageSource,
        C: ContentConverter<P>,
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        if let Some(selector) = &self.options.wait_for {
            page.wait_for(selector, self.options.wait_timeout)?;
        }

        let name = generate_base_name(&page.title(), &page.url(), timestamp, self.options.format);
        fs::create_dir_all(&self.options.output_dir)?;
        let path = resolve_conflict(&self.options.output_dir, &name)?;

        let content = self.converter.convert(page, self.options.format)?;
        fs::write(&path, content)?;
        Ok(path)
    }
}
