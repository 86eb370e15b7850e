//! Page range expressions such as `1-5, 8, 11-13`.

use crate::error::{Error, Result};

/// A single inclusive, 1-based page span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSpan {
    pub start: u32,
    pub end: u32,
}

/// Parse a page range expression.
///
/// An empty expression means "all pages" and parses to an empty list. Any
/// other input must be a comma separated list of `N` or `N-M` with
/// `1 <= N <= M`; the error echoes the whole expression unchanged.
pub fn parse(expr: &str) -> Result<Vec<PageSpan>> {
    let malformed = || Error::MalformedPageRanges(expr.to_string());

    if expr.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut spans = Vec::new();
    for part in expr.split(',') {
        let part = part.trim();
        let (start, end) = match part.split_once('-') {
            Some((start, end)) => (parse_page(start), parse_page(end)),
            None => {
                let page = parse_page(part);
                (page, page)
            }
        };

        match (start, end) {
            (Some(start), Some(end)) if start <= end => spans.push(PageSpan { start, end }),
            _ => return Err(malformed()),
        }
    }

    Ok(spans)
}

/// Check an expression without keeping the parsed spans.
pub fn validate(expr: &str) -> Result<()> {
    parse(expr).map(|_| ())
}

fn parse_page(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok().filter(|&page| page > 0)
}
