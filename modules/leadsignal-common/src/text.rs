use std::sync::LazyLock;

use regex::Regex;

static SPACE_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").unwrap());
static LINE_EDGE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" *\n *").unwrap());
static BLANK_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Collapse runs of spaces, strip line-edge padding, and cap blank-line runs
/// at one. Cosmetic reformatting of the same page must hash identically, so
/// this runs before hashing and before boilerplate stripping.
pub fn normalize_whitespace(text: &str) -> String {
    let text = SPACE_RUN_RE.replace_all(text, " ");
    let text = LINE_EDGE_RE.replace_all(&text, "\n");
    let text = BLANK_RUN_RE.replace_all(&text, "\n\n");
    text.trim().to_string()
}
