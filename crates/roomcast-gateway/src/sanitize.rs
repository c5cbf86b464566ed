//! Inbound text sanitizing
//!
//! Trim, truncate to a code-point limit, strip angle-bracket tags. The tag
//! strip is a plain pattern pass, not an HTML sanitizer: entities are left
//! encoded and unterminated tags survive.

use std::sync::OnceLock;

use regex::Regex;

/// Default limit, in Unicode code points
pub const DEFAULT_MAX_CHARS: usize = 200;

fn tag_pattern() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"<[^>]*>").expect("tag pattern is valid"))
}

fn block_pattern() -> &'static Regex {
    static BLOCK: OnceLock<Regex> = OnceLock::new();
    BLOCK.get_or_init(|| {
        Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>")
            .expect("block pattern is valid")
    })
}

/// Sanitize with the default 200 code point limit
pub fn sanitize(msg: &str) -> String {
    sanitize_with_limit(msg, DEFAULT_MAX_CHARS)
}

/// Trim, keep at most `max_chars` code points, strip tags, trim again
pub fn sanitize_with_limit(msg: &str, max_chars: usize) -> String {
    let trimmed = msg.trim();
    let truncated = truncate_chars(trimmed, max_chars);
    strip_html_tags(truncated).trim().to_string()
}

/// Longest prefix of `s` with at most `max_chars` code points
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Drop script/style blocks with their content, then every `<...>` span
pub fn strip_html_tags(input: &str) -> String {
    let without_blocks = block_pattern().replace_all(input, "");
    tag_pattern().replace_all(&without_blocks, "").into_owned()
}
