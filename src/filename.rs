//! Output filename generation
//!
//! Names have the shape `{yyyy-MM-dd-HHmmss}-{slug}.{ext}`. Collisions are resolved by probing
//! the target directory and inserting a numeric suffix before the last extension. Nothing is
//! locked or reserved: the caller is expected to write the file right after resolving the name.

use crate::{error::{BrowserError, Result},
            format::Format};
use chrono::{DateTime, TimeZone};
use std::path::{Path, PathBuf};
use url::Url;

/// Maximum slug length used for generated filenames
pub const MAX_SLUG_LEN: usize = 80;

/// Upper bound on suffixes tried by [`resolve_conflict`]
pub const MAX_CONFLICT_ATTEMPTS: usize = 10_000;

const SEPARATOR: char = '-';
const FALLBACK_SLUG: &str = "page";

/// Turn free text into a lowercase, filesystem-safe token of at most `max_len` characters
pub fn slugify(text: &str, max_len: usize) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_separator = false;

    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push(SEPARATOR);
            }
            pending_separator = false;
            slug.push(c);
        } else {
            pending_separator = true;
        }
    }

    // Only ASCII is ever pushed, so byte truncation is safe
    if slug.len() > max_len {
        slug.truncate(max_len);
    }
    slug.trim_end_matches(SEPARATOR).to_string()
}

/// Build `{timestamp}-{slug}.{ext}` from a page title, falling back to the URL host
pub fn generate_base_name<Tz>(title: &str, url: &str, timestamp: &DateTime<Tz>, format: Format) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let mut slug = slugify(title, MAX_SLUG_LEN);
    if slug.is_empty() {
        slug = host_slug(url).unwrap_or_default();
    }
    if slug.is_empty() {
        slug = FALLBACK_SLUG.to_string();
    }

    format!("{}-{}.{}", timestamp.format("%Y-%m-%d-%H%M%S"), slug, format.extension())
}

fn host_slug(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let host = match parsed.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };
    Some(slugify(&host, MAX_SLUG_LEN))
}

/// Return a path in `dir` for `candidate` that does not exist yet
///
/// `a.b.md` becomes `a.b-1.md`, `a.b-2.md`, and so on.
pub fn resolve_conflict(dir: &Path, candidate: &str) -> Result<PathBuf> {
    let first = dir.join(candidate);
    if !first.exists() {
        return Ok(first);
    }

    let (stem, extension) = split_last_extension(candidate);
    for n in 1..=MAX_CONFLICT_ATTEMPTS {
        let name = match extension {
            Some(ext) => format!("{}-{}.{}", stem, n, ext),
            None => format!("{}-{}", stem, n),
        };
        let path = dir.join(name);
        if !path.exists() {
            return Ok(path);
        }
    }

    Err(BrowserError::ConflictResolutionExhausted {
        name: candidate.to_string(),
        attempts: MAX_CONFLICT_ATTEMPTS,
    })
}

fn split_last_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(pos) if pos > 0 && pos + 1 < name.len() => (&name[..pos], Some(&name[pos + 1..])),
        _ => (name, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Hello, World!", 50), "hello-world");
        assert_eq!(slugify("  --Rust   Docs--  ", 50), "rust-docs");
        assert_eq!(slugify("Déjà vu", 50), "d-j-vu");
    }

    #[test]
    fn test_slugify_empty_inputs() {
        assert_eq!(slugify("", 50), "");
        assert_eq!(slugify("   \t\n", 50), "");
        assert_eq!(slugify("-- __ !!", 50), "");
    }

    #[test]
    fn test_slugify_truncation_strips_separator() {
        assert_eq!(slugify("abcd efgh", 5), "abcd");
        assert_eq!(slugify("abcd efgh", 6), "abcd-e");
        assert_eq!(slugify("abcdefgh", 3), "abc");
    }

    #[test]
    fn test_slugify_is_fixed_point() {
        let inputs = ["Hello World", "  a--b__c  ", "GitHub - rust-lang/rust: Empowering", "x", "1.2.3"];
        for input in inputs {
            for max_len in [1, 3, 8, 80] {
                let once = slugify(input, max_len);
                assert_eq!(slugify(&once, max_len), once, "input {:?} max {}", input, max_len);
                assert!(!once.starts_with('-') && !once.ends_with('-'));
                assert!(once.len() <= max_len);
            }
        }
    }

    #[test]
    fn test_generate_base_name_from_host() {
        let ts = Utc.with_ymd_and_hms(2025, 10, 21, 14, 30, 45).unwrap();
        assert_eq!(
            generate_base_name("", "https://example.com", &ts, Format::Markdown),
            "2025-10-21-143045-example-com.md"
        );
        assert_eq!(
            generate_base_name("", "http://localhost:8080/x", &ts, Format::Html),
            "2025-10-21-143045-localhost-8080.html"
        );
    }

    #[test]
    fn test_generate_base_name_prefers_title() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(
            generate_base_name("The Rust Book", "https://doc.rust-lang.org", &ts, Format::Pdf),
            "2025-01-02-030405-the-rust-book.pdf"
        );
    }

    #[test]
    fn test_generate_base_name_unparseable_url() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(generate_base_name("", "not a url", &ts, Format::Text), "2025-01-02-030405-page.txt");
        assert_eq!(generate_base_name("!!!", "about:blank", &ts, Format::Png), "2025-01-02-030405-page.png");
    }

    #[test]
    fn test_resolve_conflict_free_name() {
        let dir = TempDir::new().unwrap();
        assert_eq!(resolve_conflict(dir.path(), "test.md").unwrap(), dir.path().join("test.md"));
    }

    #[test]
    fn test_resolve_conflict_increments() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("test.md"), "").unwrap();
        fs::write(dir.path().join("test-1.md"), "").unwrap();

        assert_eq!(resolve_conflict(dir.path(), "test.md").unwrap(), dir.path().join("test-2.md"));
    }

    #[test]
    fn test_resolve_conflict_suffix_before_last_extension() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.b.ext"), "").unwrap();
        assert_eq!(resolve_conflict(dir.path(), "a.b.ext").unwrap(), dir.path().join("a.b-1.ext"));

        fs::write(dir.path().join("noext"), "").unwrap();
        assert_eq!(resolve_conflict(dir.path(), "noext").unwrap(), dir.path().join("noext-1"));
    }

    #[test]
    fn test_resolve_conflict_monotonic() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("base.md"), "").unwrap();
        for n in 1..7 {
            fs::write(dir.path().join(format!("base-{}.md", n)), "").unwrap();
        }
        assert_eq!(resolve_conflict(dir.path(), "base.md").unwrap(), dir.path().join("base-7.md"));
    }
}
