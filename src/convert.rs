//! Rendering a live page into one of the output [`Format`]s

use crate::{error::{BrowserError, Result},
            format::Format};
use headless_chrome::{protocol::cdp::Page::CaptureScreenshotFormatOption, Tab};
use std::{sync::Arc, time::Duration};

/// A loaded page that can be waited on and named
pub trait PageSource {
    fn url(&self) -> String;

    /// Page title, empty when the page has none
    fn title(&self) -> String;

    /// Block until `selector` matches an element or `timeout` elapses
    fn wait_for(&self, selector: &str, timeout: Duration) -> Result<()>;
}

/// Produces the bytes written for a page in a given format
pub trait ContentConverter<P: ?Sized> {
    fn convert(&self, page: &P, format: Format) -> Result<Vec<u8>>;
}

impl PageSource for Arc<Tab> {
    fn url(&self) -> String {
        self.get_url()
    }

    fn title(&self) -> String {
        self.get_title().unwrap_or_default()
    }

    fn wait_for(&self, selector: &str, timeout: Duration) -> Result<()> {
        self.wait_for_element_with_custom_timeout(selector, timeout)
            .map(|_| ())
            .map_err(|e| BrowserError::WaitTimeout { selector: selector.to_string(), reason: e.to_string() })
    }
}

/// Converter that pulls content straight out of a Chrome tab
///
/// HTML is taken from the rendered DOM, markdown is produced from that HTML with `html2md`,
/// text is the body's `innerText`, and PDF/PNG come from the DevTools print and screenshot calls.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChromeConverter;

impl ContentConverter<Arc<Tab>> for ChromeConverter {
    fn convert(&self, tab: &Arc<Tab>, format: Format) -> Result<Vec<u8>> {
        let failed = |e: &dyn std::fmt::Display| BrowserError::ConversionFailed {
            format: format.to_string(),
            reason: e.to_string(),
        };

        match format {
            Format::Html => tab.get_content().map(String::into_bytes).map_err(|e| failed(&e)),
            Format::Markdown => {
                let html = tab.get_content().map_err(|e| failed(&e))?;
                Ok(html_to_markdown(&html).into_bytes())
            }
            Format::Text => {
                let result = tab
                    .evaluate("document.body ? document.body.innerText : ''", false)
                    .map_err(|e| failed(&e))?;
                let text = result
                    .value
                    .as_ref()
                    .and_then(|value| value.as_str())
                    .ok_or_else(|| failed(&"No text returned from page"))?;
                Ok(text.as_bytes().to_vec())
            }
            Format::Pdf => tab.print_to_pdf(None).map_err(|e| failed(&e)),
            Format::Png => tab
                .capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
                .map_err(|e| failed(&e)),
        }
    }
}

/// Convert rendered HTML into markdown, trimming the blank runs html2md leaves behind
pub fn html_to_markdown(html: &str) -> String {
    let markdown = html2md::parse_html(html);
    let mut out = String::with_capacity(markdown.len());
    let mut blank_run = 0;

    for line in markdown.trim().lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_to_markdown_headings() {
        let markdown = html_to_markdown("<h1>Title</h1><p>Hello <strong>world</strong></p>");
        assert!(markdown.contains("Title"));
        assert!(markdown.contains("**world**"));
        assert!(markdown.ends_with('\n'));
    }

    #[test]
    fn test_html_to_markdown_collapses_blank_lines() {
        let markdown = html_to_markdown("<p>one</p><br><br><br><p>two</p>");
        assert!(!markdown.contains("\n\n\n"));
    }
}
