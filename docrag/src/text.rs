//! Normalization of uploaded text before chunking.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Captures, Regex};

static EXCESS_BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("unreachable error: invalid blank line pattern"));
static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```.*?```").expect("unreachable error: invalid fence pattern"));
static LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(.*?)\]\((.*?)\)").expect("unreachable error: invalid link pattern")
});
static HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^([ \t]*)#+([ \t]*)").expect("unreachable error: invalid heading pattern")
});
static BOLD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\*\*([^*]+)\*\*").expect("unreachable error: invalid bold pattern")
});
static ITALIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*([^*]+)\*").expect("unreachable error: invalid italic pattern"));

const KNOWN_EXTENSIONS: [&str; 4] = [".pdf", ".md", ".markdown", ".txt"];

/// Whether `filename` names a markdown file.
pub fn is_markdown(filename: &str) -> bool {
    let name = filename.to_ascii_lowercase();
    name.ends_with(".md") || name.ends_with(".markdown")
}

/// Clean up uploaded text so paragraph boundaries survive chunking.
///
/// Carriage returns are removed, tabs become spaces and runs of three or more
/// newlines collapse to one blank line. Markdown sources additionally lose
/// their inline formatting: fenced code is set apart as its own paragraph,
/// links keep only their label, heading markers collapse to a single `#`,
/// and bold or italic markers are dropped.
pub fn normalize_text(raw: &str, filename: &str) -> String {
    let text = raw.replace('\r', "").replace('\t', " ");
    let text = EXCESS_BLANK_LINES.replace_all(&text, "\n\n");

    if !is_markdown(filename) {
        return text.into_owned();
    }

    let text = CODE_FENCE
        .replace_all(&text, |caps: &Captures| format!("\n\n{}\n\n", caps[0].replace("```", "")));
    let text = LINK.replace_all(&text, "$1");
    let text = HEADING.replace_all(&text, "${1}#${2}");
    let text = BOLD.replace_all(&text, "$1");
    let text: Cow<'_, str> = ITALIC.replace_all(&text, "$1");
    text.into_owned()
}

/// Derive a display title by dropping a known document extension.
pub fn title_from_filename(filename: &str) -> String {
    let lower = filename.to_ascii_lowercase();
    KNOWN_EXTENSIONS
        .iter()
        .find(|ext| lower.ends_with(*ext))
        .map(|ext| filename[..filename.len() - ext.len()].to_string())
        .unwrap_or_else(|| filename.to_string())
}
