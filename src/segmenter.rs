//! Sliding-window text segmentation and page-label heuristics.
//!
//! A page of extracted text is split into overlapping word windows; the
//! window size and overlap are counted in whitespace-separated words.
//! Independently, the page's lines are scanned for structural labels
//! (heading, jurisdiction section, part/section numeral) used as chunk
//! metadata.

use std::sync::LazyLock;

use regex::Regex;

/// Default window size, in words.
pub const DEFAULT_WINDOW_WORDS: usize = 320;
/// Default overlap between consecutive windows, in words.
pub const DEFAULT_OVERLAP_WORDS: usize = 60;

static HEADING_PAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bRule\s*\d+\b|\bOvertaking\b").expect("heading pattern"));
static SECTION_PAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bINTERNATIONAL\b|\bINLAND\b").expect("section pattern"));
static PART_SECTION_PAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Part\s+[A-Z]\b|Section\s+[IVX]+\b").expect("part/section pattern")
});

/// Structural labels recovered from one page of text.
///
/// Each label is the first matching line, trimmed; a page with no match
/// yields `None`, never an empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageLabels {
    pub heading: Option<String>,
    pub section: Option<String>,
    pub part_section: Option<String>,
}

/// Splits `words` into consecutive windows of `target` words advancing by
/// `target - overlap` words per step.
///
/// Every word is covered by at least one window; consecutive windows share
/// exactly `overlap` words except possibly the final pair when the tail is
/// shorter than a full window. The final window may be short but is never
/// empty.
pub fn chunk_words<'a>(words: &'a [&'a str], target: usize, overlap: usize) -> Vec<&'a [&'a str]> {
    let target = target.max(1);
    let step = target.saturating_sub(overlap).max(1);
    let mut windows = Vec::new();
    let mut start = 0;
    while start < words.len() {
        let end = (start + target).min(words.len());
        windows.push(&words[start..end]);
        start += step;
    }
    windows
}

/// Windows `text` by words and joins each window back into a string.
pub fn chunk_text(text: &str, target: usize, overlap: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    chunk_words(&words, target, overlap)
        .into_iter()
        .map(|window| window.join(" "))
        .collect()
}

/// Scans the page's lines for structural labels.
///
/// The three scans are independent: each takes the first line matching its
/// pattern, so a single line may satisfy more than one label.
pub fn page_labels(page_text: &str) -> PageLabels {
    PageLabels {
        heading: first_matching_line(page_text, &HEADING_PAT),
        section: first_matching_line(page_text, &SECTION_PAT),
        part_section: first_matching_line(page_text, &PART_SECTION_PAT),
    }
}

fn first_matching_line(text: &str, pattern: &Regex) -> Option<String> {
    text.lines()
        .find(|line| pattern.is_match(line))
        .map(|line| line.trim().to_string())
}
