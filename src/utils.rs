use crate::error::{BrowserError, Result};
use std::{fs, path::Path};

const KNOWN_SCHEMES: [&str; 7] = ["http://", "https://", "file://", "data:", "about:", "chrome://", "chrome-extension://"];

/// Add a scheme to a URL typed without one
///
/// Local hosts get `http://`, everything else `https://`.
pub fn normalize_url(url: &str) -> String {
    let trimmed = url.trim();

    if KNOWN_SCHEMES.iter().any(|scheme| trimmed.to_ascii_lowercase().starts_with(scheme)) {
        return trimmed.to_string();
    }

    if trimmed.starts_with("localhost") || trimmed.starts_with("127.0.0.1") || trimmed.starts_with("[::1]") {
        return format!("http://{}", trimmed);
    }

    format!("https://{}", trimmed)
}

/// Parse a URL list: one URL per line, `#` starts a comment, blank lines are skipped
pub fn parse_url_list(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(|line| match line.find(" #") {
            Some(pos) => &line[..pos],
            None => line,
        })
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(normalize_url)
        .collect()
}

/// Read and parse a URL list file
pub fn load_url_file(path: &Path) -> Result<Vec<String>> {
    let contents = fs::read_to_string(path)
        .map_err(|e| BrowserError::InvalidInput(format!("cannot read URL file {}: {}", path.display(), e)))?;
    Ok(parse_url_list(&contents))
}
