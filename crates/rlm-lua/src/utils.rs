//! Context utility library.
//!
//! Pure functions over a reference string. The execution context installs
//! Lua wrappers for these at `initialize` time (see `bindings`); the Rust
//! functions here take the text explicitly and never touch Lua.
//!
//! # Conventions
//!
//! | Concern | Rule |
//! |---------|------|
//! | Patterns | `regex` syntax, case-insensitive, at most [`MAX_PATTERN_LENGTH`] characters |
//! | Offsets | 0-based character offsets, end-exclusive |
//! | Lines | `str::lines` (no phantom empty line after a trailing `\n`), 1-indexed |

use crate::error::UtilityError;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::cmp::Reverse;

/// Longest accepted pattern, in characters.
pub const MAX_PATTERN_LENGTH: usize = 500;

/// Returned by [`quote_match`] when nothing matches.
pub const NOT_FOUND: &str = "not found";

/// Marker appended to truncated quotes.
const ELLIPSIS: &str = "...";

/// Default `window` for [`search_context`].
pub const DEFAULT_WINDOW: usize = 50;

/// Default `max_results` for [`search_context`].
pub const DEFAULT_MAX_RESULTS: usize = 100;

/// Default `max_length` for [`quote_match`].
pub const DEFAULT_QUOTE_LENGTH: usize = 100;

/// One hit of [`search_context`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchMatch {
    /// Matched text.
    #[serde(rename = "match")]
    pub matched: String,
    /// Matched text plus up to `window` characters on each side.
    pub context: String,
    /// Character offset of the match start.
    pub start: usize,
    /// Character offset one past the match end.
    pub end: usize,
}

/// One record of [`extract_sections`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    /// Header match text.
    pub header: String,
    /// Text between this header and the next (or end of text).
    pub content: String,
    /// Character offset of the header.
    pub start: usize,
}

/// One hit of [`find_line`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineMatch {
    /// 1-indexed line number.
    pub line_number: usize,
    /// Line text without terminator.
    pub line: String,
}

/// Compiles a case-insensitive pattern.
///
/// # Errors
///
/// [`UtilityError::PatternTooLong`] above [`MAX_PATTERN_LENGTH`] characters,
/// [`UtilityError::InvalidPattern`] if `regex` rejects it.
pub fn compile_pattern(pattern: &str) -> Result<Regex, UtilityError> {
    build_pattern(pattern, false)
}

fn build_pattern(pattern: &str, multi_line: bool) -> Result<Regex, UtilityError> {
    let length = pattern.chars().count();
    if length > MAX_PATTERN_LENGTH {
        return Err(UtilityError::PatternTooLong {
            length,
            max: MAX_PATTERN_LENGTH,
        });
    }

    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .multi_line(multi_line)
        .build()
        .map_err(|e| UtilityError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
}

/// Converts ascending byte offsets into character offsets in one pass.
struct CharCursor<'a> {
    text: &'a str,
    byte: usize,
    chars: usize,
}

impl<'a> CharCursor<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            byte: 0,
            chars: 0,
        }
    }

    /// `byte` must not precede the previous call's offset.
    fn advance_to(&mut self, byte: usize) -> usize {
        if byte > self.byte {
            self.chars += self.text[self.byte..byte].chars().count();
            self.byte = byte;
        }
        self.chars
    }
}

/// Splits `text` into `size`-character slices.
///
/// Each slice starts `size - overlap` characters after the previous one.
/// The step is clamped to at least 1, so `overlap >= size` advances one
/// character per slice. `size <= 0` returns the whole text as one chunk.
/// Negative `overlap` counts as 0.
#[must_use]
pub fn chunk_text(text: &str, size: i64, overlap: i64) -> Vec<String> {
    let Ok(size) = usize::try_from(size) else {
        return vec![text.to_string()];
    };
    if size == 0 {
        return vec![text.to_string()];
    }
    let overlap = usize::try_from(overlap).unwrap_or(0);
    let step = size.saturating_sub(overlap).max(1);

    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = bounds.len() - 1;

    (0..char_count)
        .step_by(step)
        .map(|start| {
            let end = start.saturating_add(size).min(char_count);
            text[bounds[start]..bounds[end]].to_string()
        })
        .collect()
}

/// Finds matches of `pattern` with `window` characters of surrounding text.
///
/// Stops after `max_results` matches.
///
/// # Errors
///
/// Pattern validation errors (see [`compile_pattern`]).
pub fn search_context(
    text: &str,
    pattern: &str,
    window: usize,
    max_results: usize,
) -> Result<Vec<SearchMatch>, UtilityError> {
    let re = compile_pattern(pattern)?;
    let mut cursor = CharCursor::new(text);
    let mut results = Vec::new();

    for m in re.find_iter(text).take(max_results) {
        let before = back_chars(text, m.start(), window);
        let after = forward_chars(text, m.end(), window);
        let start = cursor.advance_to(m.start());
        let end = cursor.advance_to(m.end());
        results.push(SearchMatch {
            matched: m.as_str().to_string(),
            context: text[before..after].to_string(),
            start,
            end,
        });
    }

    Ok(results)
}

/// Byte offset `n` characters before `from`, clamped to 0.
fn back_chars(text: &str, from: usize, n: usize) -> usize {
    if n == 0 {
        return from;
    }
    text[..from]
        .char_indices()
        .rev()
        .nth(n - 1)
        .map_or(0, |(i, _)| i)
}

/// Byte offset `n` characters after `from`, clamped to the end.
fn forward_chars(text: &str, from: usize, n: usize) -> usize {
    text[from..]
        .char_indices()
        .nth(n)
        .map_or(text.len(), |(i, _)| from + i)
}

/// Counts matches of `pattern`.
///
/// # Errors
///
/// Pattern validation errors (see [`compile_pattern`]).
pub fn count_matches(text: &str, pattern: &str) -> Result<usize, UtilityError> {
    let re = compile_pattern(pattern)?;
    Ok(re.find_iter(text).count())
}

/// Extracts the first JSON structure embedded in `text`.
///
/// Candidates are the span from the first `{` to the last `}` and from the
/// first `[` to the last `]`. The longer candidate is tried first.
#[must_use]
pub fn extract_json(text: &str) -> Option<serde_json::Value> {
    let mut candidates: Vec<&str> = [delimited(text, '{', '}'), delimited(text, '[', ']')]
        .into_iter()
        .flatten()
        .collect();
    candidates.sort_by_key(|c| Reverse(c.len()));

    candidates
        .into_iter()
        .find_map(|candidate| serde_json::from_str(candidate).ok())
}

fn delimited(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..end + close.len_utf8()])
}

/// Splits `text` at each line matching `header_pattern`.
///
/// The pattern runs in multi-line mode (`^` and `$` anchor lines). Only the
/// first match on a line opens a section. Text before the first header is
/// not part of any section.
///
/// # Errors
///
/// Pattern validation errors (see [`compile_pattern`]).
pub fn extract_sections(text: &str, header_pattern: &str) -> Result<Vec<Section>, UtilityError> {
    let re = build_pattern(header_pattern, true)?;
    let mut headers: Vec<regex::Match<'_>> = Vec::new();
    let mut line_end = None;
    for m in re.find_iter(text) {
        if line_end.is_some_and(|end| m.start() <= end) {
            continue;
        }
        line_end = Some(text[m.start()..].find('\n').map_or(text.len(), |i| m.start() + i));
        headers.push(m);
    }
    let mut cursor = CharCursor::new(text);

    let sections = headers
        .iter()
        .enumerate()
        .map(|(i, header)| {
            let content_end = headers.get(i + 1).map_or(text.len(), |next| next.start());
            Section {
                header: header.as_str().to_string(),
                content: text[header.end()..content_end].to_string(),
                start: cursor.advance_to(header.start()),
            }
        })
        .collect();

    Ok(sections)
}

/// Lists every line matching `pattern`.
///
/// # Errors
///
/// Pattern validation errors (see [`compile_pattern`]).
pub fn find_line(text: &str, pattern: &str) -> Result<Vec<LineMatch>, UtilityError> {
    let re = compile_pattern(pattern)?;
    Ok(text
        .lines()
        .enumerate()
        .filter(|(_, line)| re.is_match(line))
        .map(|(i, line)| LineMatch {
            line_number: i + 1,
            line: line.to_string(),
        })
        .collect())
}

/// Counts lines, or only the lines matching `pattern`.
///
/// # Errors
///
/// Pattern validation errors (see [`compile_pattern`]).
pub fn count_lines(text: &str, pattern: Option<&str>) -> Result<usize, UtilityError> {
    match pattern {
        None => Ok(text.lines().count()),
        Some(pattern) => {
            let re = compile_pattern(pattern)?;
            Ok(text.lines().filter(|line| re.is_match(line)).count())
        }
    }
}

/// Returns line `n` (1-indexed), or `""` when out of range.
#[must_use]
pub fn get_line(text: &str, n: i64) -> String {
    let Some(index) = usize::try_from(n).ok().and_then(|n| n.checked_sub(1)) else {
        return String::new();
    };
    text.lines().nth(index).unwrap_or_default().to_string()
}

/// Returns the first match, truncated to `max_length` characters plus
/// `...`, or [`NOT_FOUND`].
///
/// # Errors
///
/// Pattern validation errors (see [`compile_pattern`]).
pub fn quote_match(text: &str, pattern: &str, max_length: usize) -> Result<String, UtilityError> {
    let re = compile_pattern(pattern)?;
    let Some(m) = re.find(text) else {
        return Ok(NOT_FOUND.to_string());
    };

    let quoted = m.as_str();
    if quoted.chars().count() <= max_length {
        return Ok(quoted.to_string());
    }
    let mut truncated: String = quoted.chars().take(max_length).collect();
    truncated.push_str(ELLIPSIS);
    Ok(truncated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // === chunk_text ===

    #[test]
    fn chunk_without_overlap() {
        assert_eq!(chunk_text("abcdef", 2, 0), vec!["ab", "cd", "ef"]);
        assert_eq!(chunk_text("abcdefg", 3, 0), vec!["abc", "def", "g"]);
    }

    #[test]
    fn chunk_with_overlap() {
        assert_eq!(chunk_text("abcdef", 4, 2), vec!["abcd", "cdef", "ef"]);
    }

    #[test]
    fn chunk_overlap_at_or_above_size_steps_by_one() {
        assert_eq!(chunk_text("abcd", 2, 2), vec!["ab", "bc", "cd", "d"]);
        assert_eq!(chunk_text("abc", 2, 5), vec!["ab", "bc", "c"]);
    }

    #[test]
    fn chunk_non_positive_size_returns_whole() {
        assert_eq!(chunk_text("abcdef", 0, 0), vec!["abcdef"]);
        assert_eq!(chunk_text("abcdef", -3, 1), vec!["abcdef"]);
    }

    #[test]
    fn chunk_negative_overlap_is_zero() {
        assert_eq!(chunk_text("abcd", 2, -1), vec!["ab", "cd"]);
    }

    #[test]
    fn chunk_empty_text() {
        assert!(chunk_text("", 3, 0).is_empty());
    }

    #[test]
    fn chunk_counts_characters_not_bytes() {
        assert_eq!(chunk_text("héllo", 2, 0), vec!["hé", "ll", "o"]);
    }

    // === patterns ===

    #[test]
    fn pattern_is_case_insensitive() {
        let re = compile_pattern("hello").expect("valid");
        assert!(re.is_match("HeLLo world"));
    }

    #[test]
    fn pattern_length_limit() {
        let ok = "a".repeat(MAX_PATTERN_LENGTH);
        assert!(compile_pattern(&ok).is_ok());

        let long = "a".repeat(MAX_PATTERN_LENGTH + 1);
        assert_eq!(
            compile_pattern(&long).expect_err("too long"),
            UtilityError::PatternTooLong {
                length: 501,
                max: 500
            }
        );
    }

    #[test]
    fn invalid_pattern_is_described() {
        let err = compile_pattern("(unclosed").expect_err("invalid");
        assert!(matches!(err, UtilityError::InvalidPattern { .. }));
        assert!(err.to_string().contains("(unclosed"));
    }

    // === search_context / count_matches ===

    #[test]
    fn search_reports_offsets_and_window() {
        let text = "the quick brown fox";
        let hits = search_context(text, "BROWN", 4, 10).expect("valid");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].matched, "brown");
        assert_eq!(hits[0].start, 10);
        assert_eq!(hits[0].end, 15);
        assert_eq!(hits[0].context, "ick brown fox");
    }

    #[test]
    fn search_window_clamped_to_bounds() {
        let hits = search_context("abc", "b", 50, 10).expect("valid");
        assert_eq!(hits[0].context, "abc");
    }

    #[test]
    fn search_respects_max_results() {
        let text = "a a a a a a";
        let hits = search_context(text, "a", 1, 3).expect("valid");
        assert_eq!(hits.len(), 3);
        assert_eq!(count_matches(text, "a").expect("valid"), 6);
    }

    #[test]
    fn search_zero_max_results() {
        assert!(search_context("aaa", "a", 5, 0).expect("valid").is_empty());
    }

    #[test]
    fn search_offsets_are_characters() {
        let hits = search_context("ééx", "x", 0, 1).expect("valid");
        assert_eq!(hits[0].start, 2);
        assert_eq!(hits[0].end, 3);
        assert_eq!(hits[0].context, "x");
    }

    #[test]
    fn count_matches_agrees_with_search() {
        let text = "Error: a\nerror: b\nok\nERROR: c";
        let count = count_matches(text, "error").expect("valid");
        let hits = search_context(text, "error", 0, usize::MAX).expect("valid");
        assert_eq!(count, 3);
        assert_eq!(hits.len(), count);
    }

    // === extract_json ===

    #[test]
    fn extract_json_object() {
        let text = r#"answer: {"a": 1, "b": [1, 2]} done"#;
        assert_eq!(extract_json(text), Some(json!({"a": 1, "b": [1, 2]})));
    }

    #[test]
    fn extract_json_prefers_longer_candidate() {
        let text = r#"[{"x": 1}, {"x": 2}]"#;
        assert_eq!(extract_json(text), Some(json!([{"x": 1}, {"x": 2}])));
    }

    #[test]
    fn extract_json_falls_back_to_other_candidate() {
        // The brace span is longer but does not parse.
        let text = r#"{ nope [1, 2, 3] still nope }"#;
        assert_eq!(extract_json(text), Some(json!([1, 2, 3])));
    }

    #[test]
    fn extract_json_not_found() {
        assert_eq!(extract_json("no structure here"), None);
        assert_eq!(extract_json("} backwards {"), None);
    }

    // === extract_sections ===

    #[test]
    fn sections_split_at_headers() {
        let text = "intro\n# One\nalpha\n# Two\nbeta\n";
        let sections = extract_sections(text, r"^# \w+").expect("valid");
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].header, "# One");
        assert_eq!(sections[0].content, "\nalpha\n");
        assert_eq!(sections[0].start, 6);
        assert_eq!(sections[1].header, "# Two");
        assert_eq!(sections[1].content, "\nbeta\n");
    }

    #[test]
    fn sections_take_first_match_per_line() {
        let text = "## a ## b\nbody\n## c\n";
        let sections = extract_sections(text, "## ").expect("valid");
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].start, 0);
        assert_eq!(sections[0].content, "a ## b\nbody\n");
        assert_eq!(sections[1].start, 15);
        assert_eq!(sections[1].content, "c\n");
    }

    #[test]
    fn sections_none_when_no_header() {
        assert!(extract_sections("plain", "^#").expect("valid").is_empty());
    }

    // === lines ===

    #[test]
    fn line_helpers() {
        let text = "A\nB\nC";
        assert_eq!(get_line(text, 2), "B");
        assert_eq!(get_line(text, 99), "");
        assert_eq!(get_line(text, 0), "");
        assert_eq!(get_line(text, -1), "");
        assert_eq!(count_lines(text, None).expect("valid"), 3);
        assert_eq!(count_lines("A\nB\nC\n", None).expect("valid"), 3);
    }

    #[test]
    fn find_and_count_matching_lines() {
        let text = "apple\nbanana\nApricot";
        let found = find_line(text, "^ap").expect("valid");
        assert_eq!(
            found,
            vec![
                LineMatch {
                    line_number: 1,
                    line: "apple".into()
                },
                LineMatch {
                    line_number: 3,
                    line: "Apricot".into()
                },
            ]
        );
        assert_eq!(count_lines(text, Some("an")).expect("valid"), 1);
    }

    // === quote_match ===

    #[test]
    fn quote_match_variants() {
        let text = "The answer is forty-two.";
        assert_eq!(quote_match(text, "answer", 100).expect("valid"), "answer");
        assert_eq!(quote_match(text, "answer.*", 6).expect("valid"), "answer...");
        assert_eq!(quote_match(text, "zebra", 100).expect("valid"), NOT_FOUND);
    }

    #[test]
    fn quote_match_rejects_long_pattern() {
        let long = "x".repeat(600);
        assert!(quote_match("x", &long, 10).is_err());
    }
}
