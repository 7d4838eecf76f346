//! Query-time snippet extraction and HTML-safe term highlighting.

use regex::RegexBuilder;
use tracing::warn;

/// Characters of context kept on each side of the best window.
pub const DEFAULT_MARGIN: usize = 40;

/// Highlighting considers at most this many query terms, longest first.
pub const MAX_HIGHLIGHT_TERMS: usize = 6;

fn fold(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

/// Split a query into distinct lowercase whitespace-delimited terms, in query order.
pub fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for term in query.split_whitespace() {
        let term: String = term.chars().map(fold).collect();
        if !terms.contains(&term) {
            terms.push(term);
        }
    }
    terms
}

/// Locate the excerpt of `text` that best matches `query`.
///
/// Equivalent to [`best_snippet_with_margin`] with [`DEFAULT_MARGIN`].
pub fn best_snippet(text: &str, query: &str, window: usize) -> String {
    best_snippet_with_margin(text, query, window, DEFAULT_MARGIN)
}

/// Locate the excerpt of `text` that best matches `query`.
///
/// A window of `window` characters slides over the lowercased text with a
/// stride of half its size. Each window scores the number of distinct query
/// terms it contains and the earliest best window wins. The excerpt is that
/// window widened by `margin` characters on both sides, clipped to the text.
///
/// If the query has no terms or no window contains any term, the first
/// `window` characters are returned.
pub fn best_snippet_with_margin(text: &str, query: &str, window: usize, margin: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    let terms = query_terms(query);
    let leading = || -> String { chars[..window.min(chars.len())].iter().collect() };

    if terms.is_empty() {
        return leading();
    }

    let lower: Vec<char> = chars.iter().copied().map(fold).collect();
    let stride = (window / 2).max(1);
    let (mut best_start, mut best_score) = (0, 0);

    for start in (0..lower.len()).step_by(stride) {
        let end = start.saturating_add(window).min(lower.len());
        let segment: String = lower[start..end].iter().collect();
        let score = terms.iter().filter(|t| segment.contains(t.as_str())).count();
        if score > best_score {
            best_score = score;
            best_start = start;
        }
    }

    if best_score == 0 {
        return leading();
    }

    let start = best_start.saturating_sub(margin);
    let end = best_start.saturating_add(window).saturating_add(margin).min(chars.len());
    chars[start..end].iter().collect()
}

/// Escape the five HTML-significant characters.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Render `text` as escaped HTML with query terms wrapped in `<mark>`.
///
/// Up to [`MAX_HIGHLIGHT_TERMS`] terms are matched literally and
/// case-insensitively, longer terms taking precedence over shorter ones at
/// the same position. Matching runs on the raw text and every piece is escaped
/// on output, so neither the text nor the query can introduce markup.
pub fn highlight(text: &str, query: &str) -> String {
    let mut terms = query_terms(query);
    terms.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()));
    terms.truncate(MAX_HIGHLIGHT_TERMS);

    if terms.is_empty() {
        return escape_html(text);
    }

    let pattern = terms.iter().map(|t| regex::escape(t)).collect::<Vec<_>>().join("|");
    let re = match RegexBuilder::new(&pattern).case_insensitive(true).build() {
        Ok(re) => re,
        Err(e) => {
            warn!(error = %e, "highlight pattern rejected, returning unmarked text");
            return escape_html(text);
        }
    };

    let mut out = String::with_capacity(text.len() + 16);
    let mut last = 0;
    for m in re.find_iter(text) {
        out.push_str(&escape_html(&text[last..m.start()]));
        out.push_str("<mark>");
        out.push_str(&escape_html(m.as_str()));
        out.push_str("</mark>");
        last = m.end();
    }
    out.push_str(&escape_html(&text[last..]));
    out
}
