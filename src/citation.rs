//! Citation formatting and merging
//!
//! Citations are cached per thread for the lifetime of one run. How they get
//! into the cache is up to the caller (a search integration); this module only
//! reads and formats them.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use tokio::sync::RwLock;

pub const REFERENCES_HEADING: &str = "### References";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Citation {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
}

impl Citation {
    /// Explicit source, else the one embedded in a "Headline - Source, ..." title.
    pub fn display_source(&self) -> String {
        if !self.source.trim().is_empty() {
            return self.source.trim().to_string();
        }

        match self.title.rsplit_once(" - ") {
            Some((_, tail)) => tail
                .split(',')
                .next()
                .unwrap_or(tail)
                .trim()
                .to_string(),
            None => "Unknown Source".to_string(),
        }
    }
}

/// Markdown references section for `citations`, in the given order.
pub fn format_citations(citations: &[Citation]) -> String {
    if citations.is_empty() {
        return format!("{}\n\nNo citations available.", REFERENCES_HEADING);
    }

    let mut out = format!("{}\n\n", REFERENCES_HEADING);
    for (i, c) in citations.iter().enumerate() {
        out.push_str(&format!(
            "{}. [\"{}\" - {}]({})\n\n",
            i + 1,
            c.title,
            c.display_source(),
            c.url
        ));
    }
    out
}

/// Byte offset of a references heading that is a whole line.
fn find_references(text: &str) -> Option<usize> {
    text.match_indices(REFERENCES_HEADING)
        .map(|(i, _)| i)
        .find(|&i| {
            let rest = &text[i + REFERENCES_HEADING.len()..];
            (i == 0 || text.as_bytes()[i - 1] == b'\n')
                && (rest.is_empty() || rest.starts_with('\n') || rest.starts_with("\r\n"))
        })
}

/// Merge a fresh references section into `text`.
///
/// An existing section is replaced up to the next heading line or the end of
/// text; otherwise the section is appended after exactly one blank line.
/// No citations means no change.
pub fn enhance(text: &str, citations: &[Citation]) -> String {
    if citations.is_empty() {
        return text.to_string();
    }

    let section = format_citations(citations);

    match find_references(text) {
        Some(start) => {
            let body_start = start + REFERENCES_HEADING.len();
            let end = text[body_start..]
                .find("\n#")
                .map(|i| body_start + i + 1)
                .unwrap_or(text.len());
            format!("{}{}{}", &text[..start], section, &text[end..])
        }
        None => {
            let body = text.trim_end();
            if body.is_empty() {
                section
            } else {
                format!("{}\n\n{}", body, section)
            }
        }
    }
}

/// Per-run citation store keyed by thread id.
#[derive(Debug, Default)]
pub struct CitationCache {
    by_thread: RwLock<HashMap<String, Vec<Citation>>>,
}

impl CitationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, thread_id: &str, citations: impl IntoIterator<Item = Citation>) {
        self.by_thread
            .write()
            .await
            .entry(thread_id.to_string())
            .or_default()
            .extend(citations);
    }

    pub async fn get(&self, thread_id: &str) -> Vec<Citation> {
        self.by_thread
            .read()
            .await
            .get(thread_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn enhance_for(&self, thread_id: &str, text: &str) -> String {
        enhance(text, &self.get(thread_id).await)
    }

    /// Payload of the citation plugin's "formatted citations" call.
    pub async fn formatted_citations(&self, thread_id: &str) -> Value {
        let citations = self.get(thread_id).await;
        json!({
            "success": true,
            "citation_count": citations.len(),
            "markdown": format_citations(&citations),
            "citations": citations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cite(title: &str, url: &str, source: &str) -> Citation {
        Citation {
            title: title.to_string(),
            url: url.to_string(),
            source: source.to_string(),
            published_date: None,
        }
    }

    #[test]
    fn test_replaces_existing_section() {
        let text = "## Summary\n...\n### References\n\nOld\n";
        let out = enhance(text, &[cite("T", "u", "S")]);
        assert_eq!(out, "## Summary\n...\n### References\n\n1. [\"T\" - S](u)\n\n");
    }

    #[test]
    fn test_replacement_stops_at_next_heading() {
        let text = "Intro\n### References\n\nOld\n## Appendix\nKeep me";
        let out = enhance(text, &[cite("T", "u", "S")]);
        assert_eq!(
            out,
            "Intro\n### References\n\n1. [\"T\" - S](u)\n\n## Appendix\nKeep me"
        );
    }

    #[test]
    fn test_appends_with_one_blank_line() {
        let out = enhance("Findings.\n\n\n", &[cite("A", "a", "X"), cite("B", "b", "Y")]);
        assert_eq!(
            out,
            "Findings.\n\n### References\n\n1. [\"A\" - X](a)\n\n2. [\"B\" - Y](b)\n\n"
        );
    }

    #[test]
    fn test_idempotent() {
        let citations = vec![cite("A", "a", "X"), cite("B", "b", "")];
        for text in [
            "Plain text",
            "## Summary\n### References\n\nOld\n",
            "Intro\n### References\nOld\n# Next\nbody",
            "",
        ] {
            let once = enhance(text, &citations);
            assert_eq!(enhance(&once, &citations), once);
        }
    }

    #[test]
    fn test_no_citations_is_noop() {
        let text = "## Summary\n### References\n\nOld\n";
        assert_eq!(enhance(text, &[]), text);
    }

    #[test]
    fn test_inline_mention_is_not_a_marker() {
        let out = enhance("See ### References below", &[cite("T", "u", "S")]);
        assert!(out.starts_with("See ### References below\n\n### References"));
    }

    #[test]
    fn test_longer_heading_is_not_a_marker() {
        let text = "### References and Notes\n\nKeep\n";
        let out = enhance(text, &[cite("T", "u", "S")]);
        assert_eq!(
            out,
            "### References and Notes\n\nKeep\n\n### References\n\n1. [\"T\" - S](u)\n\n"
        );
    }

    #[test]
    fn test_heading_at_end_of_text_is_a_marker() {
        let out = enhance("Body\n### References", &[cite("T", "u", "S")]);
        assert_eq!(out, "Body\n### References\n\n1. [\"T\" - S](u)\n\n");
    }

    #[test]
    fn test_source_from_title() {
        assert_eq!(cite("Port strike - Reuters, 2024", "u", "").display_source(), "Reuters");
        assert_eq!(cite("No source here", "u", "").display_source(), "Unknown Source");
    }

    #[test]
    fn test_empty_format() {
        assert_eq!(format_citations(&[]), "### References\n\nNo citations available.");
    }

    #[tokio::test]
    async fn test_cache_is_keyed_by_thread() {
        let cache = CitationCache::new();
        cache.insert("thread_a", vec![cite("T", "u", "S")]).await;

        assert_eq!(cache.get("thread_a").await.len(), 1);
        assert!(cache.get("thread_b").await.is_empty());
        assert_eq!(cache.enhance_for("thread_b", "text").await, "text");

        let payload = cache.formatted_citations("thread_a").await;
        assert_eq!(payload["success"], true);
        assert_eq!(payload["citation_count"], 1);
        assert_eq!(payload["citations"][0]["title"], "T");
        assert!(payload["markdown"].as_str().unwrap().contains("1. [\"T\" - S](u)"));
    }
}
