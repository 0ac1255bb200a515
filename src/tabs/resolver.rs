use crate::{error::{BrowserError, Result},
            tabs::catalog::{TabCatalog, TabDescriptor}};
use regex::RegexBuilder;

/// One step of the tab matching cascade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStage {
    /// `3` or `2-4`, 1-based and inclusive
    Index,
    /// Case-insensitive equality with the tab URL
    ExactUrl,
    /// Case-insensitive containment in the tab URL
    Substring,
    /// Case-insensitive regular expression over the tab URL
    Regex,
}

type StageFn = fn(&str, &[TabDescriptor]) -> Result<Vec<TabDescriptor>>;

impl MatchStage {
    /// Stages in the order they are tried
    pub const CASCADE: [MatchStage; 4] = [MatchStage::Index, MatchStage::ExactUrl, MatchStage::Substring, MatchStage::Regex];

    fn matcher(self) -> StageFn {
        match self {
            MatchStage::Index => match_index,
            MatchStage::ExactUrl => match_exact_url,
            MatchStage::Substring => match_substring,
            MatchStage::Regex => match_regex,
        }
    }

    /// Run this stage alone against a list of tabs
    pub fn apply(self, pattern: &str, tabs: &[TabDescriptor]) -> Result<Vec<TabDescriptor>> {
        (self.matcher())(pattern, tabs)
    }
}

/// Tabs selected by a pattern, all from a single stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub stage: MatchStage,
    pub tabs: Vec<TabDescriptor>,
}

/// Resolves user patterns against a [`TabCatalog`]
pub struct TabResolver<'a> {
    catalog: &'a TabCatalog,
}

impl<'a> TabResolver<'a> {
    pub fn new(catalog: &'a TabCatalog) -> Self {
        Self { catalog }
    }

    /// Run the cascade; the first stage with at least one match wins
    pub fn resolve(&self, pattern: &str) -> Result<MatchResult> {
        if pattern.trim().is_empty() {
            return Err(BrowserError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: "pattern is empty".to_string(),
            });
        }

        for stage in MatchStage::CASCADE {
            let tabs = stage.apply(pattern, self.catalog.tabs())?;
            if !tabs.is_empty() {
                log::debug!("Pattern '{}' matched {} tab(s) by {:?}", pattern, tabs.len(), stage);
                return Ok(MatchResult { stage, tabs });
            }
        }

        Err(BrowserError::NoTabMatch(pattern.to_string()))
    }
}

#[derive(Debug, PartialEq, Eq)]
enum IndexSpec {
    Single(usize),
    Range(usize, usize),
}

fn parse_number(s: &str) -> Option<usize> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // All digits but too large to represent is still an index, just an impossible one
    Some(s.parse().unwrap_or(usize::MAX))
}

fn parse_index_spec(pattern: &str) -> Option<IndexSpec> {
    let pattern = pattern.trim();
    if let Some(n) = parse_number(pattern) {
        return Some(IndexSpec::Single(n));
    }

    let (start, end) = pattern.split_once('-')?;
    let (start, end) = (parse_number(start)?, parse_number(end)?);
    (start <= end).then_some(IndexSpec::Range(start, end))
}

fn match_index(pattern: &str, tabs: &[TabDescriptor]) -> Result<Vec<TabDescriptor>> {
    let count = tabs.len();
    match parse_index_spec(pattern) {
        None => Ok(Vec::new()),
        Some(IndexSpec::Single(index)) => {
            if index == 0 || index > count {
                return Err(BrowserError::TabIndexInvalid { index, count });
            }
            Ok(vec![tabs[index - 1].clone()])
        }
        Some(IndexSpec::Range(start, end)) => {
            if start == 0 || end > count {
                return Err(BrowserError::RangeOutOfBounds { start, end, count });
            }
            Ok(tabs[start - 1..end].to_vec())
        }
    }
}

fn match_exact_url(pattern: &str, tabs: &[TabDescriptor]) -> Result<Vec<TabDescriptor>> {
    let pattern = pattern.to_lowercase();
    Ok(tabs.iter().filter(|tab| tab.url.to_lowercase() == pattern).cloned().collect())
}

fn match_substring(pattern: &str, tabs: &[TabDescriptor]) -> Result<Vec<TabDescriptor>> {
    let pattern = pattern.to_lowercase();
    Ok(tabs.iter().filter(|tab| tab.url.to_lowercase().contains(&pattern)).cloned().collect())
}

fn match_regex(pattern: &str, tabs: &[TabDescriptor]) -> Result<Vec<TabDescriptor>> {
    let regex = RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| BrowserError::InvalidPattern { pattern: pattern.to_string(), reason: e.to_string() })?;

    Ok(tabs.iter().filter(|tab| regex.is_match(&tab.url)).cloned().collect())
}
