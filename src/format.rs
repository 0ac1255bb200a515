use crate::error::BrowserError;
use std::{fmt, str::FromStr};

/// Output format for fetched page content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Markdown,
    Html,
    Text,
    Pdf,
    Png,
}

impl Format {
    pub const ALL: [Format; 5] = [Format::Markdown, Format::Html, Format::Text, Format::Pdf, Format::Png];

    /// File extension, without the leading dot
    pub fn extension(self) -> &'static str {
        match self {
            Format::Markdown => "md",
            Format::Html => "html",
            Format::Text => "txt",
            Format::Pdf => "pdf",
            Format::Png => "png",
        }
    }

    /// Binary formats are never written to stdout
    pub fn is_binary(self) -> bool {
        matches!(self, Format::Pdf | Format::Png)
    }

    /// Parse a format name, falling back to markdown for anything unrecognized
    pub fn parse_lenient(name: &str) -> Self {
        name.parse().unwrap_or_default()
    }
}

impl FromStr for Format {
    type Err = BrowserError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "md" | "markdown" => Ok(Format::Markdown),
            "html" => Ok(Format::Html),
            "txt" | "text" => Ok(Format::Text),
            "pdf" => Ok(Format::Pdf),
            "png" => Ok(Format::Png),
            other => Err(BrowserError::InvalidInput(format!(
                "unknown format '{}' (expected md, html, text, pdf or png)",
                other
            ))),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Format::Markdown => "markdown",
            Format::Html => "html",
            Format::Text => "text",
            Format::Pdf => "pdf",
            Format::Png => "png",
        };
        f.write_str(name)
    }
}
