//! Citation extraction from finished reports.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use url::Url;

/// Characters that end a sentence or wrap a link in prose and markdown,
/// but are almost never the last character of a real URL.
const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', '\'', '"', '*', '_', '~'];

fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"https?://[^\s<>"`\[\]{}|\\^]+"#).expect("URL pattern is valid")
    })
}

/// Extract the unique `http`/`https` URLs cited in a report.
///
/// URLs are returned in order of first appearance. Trailing sentence
/// punctuation and unbalanced closing parentheses (markdown links) are not
/// part of the URL. Only the lexical shape is checked; nothing is fetched.
pub fn extract_sources(report: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut sources = Vec::new();

    for candidate in url_pattern().find_iter(report) {
        let trimmed = trim_trailing(candidate.as_str());
        if !is_well_formed(trimmed) {
            continue;
        }
        if seen.insert(trimmed.to_string()) {
            sources.push(trimmed.to_string());
        }
    }

    sources
}

fn trim_trailing(mut candidate: &str) -> &str {
    loop {
        let Some(last) = candidate.chars().last() else {
            return candidate;
        };

        let strip = if TRAILING_PUNCTUATION.contains(&last) {
            true
        } else if last == ')' {
            candidate.matches(')').count() > candidate.matches('(').count()
        } else {
            false
        };

        if !strip {
            return candidate;
        }
        candidate = &candidate[..candidate.len() - last.len_utf8()];
    }
}

fn is_well_formed(candidate: &str) -> bool {
    match Url::parse(candidate) {
        Ok(url) => {
            matches!(url.scheme(), "http" | "https")
                && url.host_str().is_some_and(|h| !h.is_empty())
        }
        Err(_) => false,
    }
}
