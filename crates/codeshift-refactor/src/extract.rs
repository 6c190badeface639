//! Extraction of code and JSON from model responses
//!
//! Pure functions only. Code extraction prefers a fence tagged with the
//! target language, then any fence, then the raw response with prose
//! marker lines stripped. JSON extraction tries a fenced `json` block, then
//! a balanced `{...}` scan, then the same two stages over a repaired copy.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```[ \t]*([A-Za-z0-9_+#.\-]*)[^\n]*\n(.*?)```").expect("valid fence regex")
});

static JSON_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?si)```[ \t]*json[^\n]*\n(.*?)```").expect("valid json fence regex")
});

static LEADING_PROSE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(here('s| is| are)\b.*|sure\b.*|certainly\b.*|okay\b.*|below is\b.*|the (updated|modified|new|refactored|complete|full) .*:|i('m| am)? (cannot|can't|am unable|unable)\b.*|sorry\b.*|```.*)$",
    )
    .expect("valid prose regex")
});

static TRAILING_PROSE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(done\.?|hope this helps.*|let me know\b.*|this (code|version|change|update)s?\b.*\.|i('ve| have) (added|updated|made|changed)\b.*|```.*)$",
    )
    .expect("valid prose regex")
});

static TRAILING_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",(\s*[}\]])").expect("valid trailing comma regex"));

static UNQUOTED_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([{,]\s*)([A-Za-z_][A-Za-z0-9_]*)(\s*:)"#).expect("valid key regex")
});

static SINGLE_QUOTED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"'((?:[^'\\\n]|\\.)*)'"#).expect("valid quote regex")
});

/// Result of parsing a structured response
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// A JSON value was recovered
    Parsed(Value),
    /// Nothing parseable was found
    Unparsed(String),
}

impl ParseOutcome {
    /// The parsed value, if any
    pub fn into_value(self) -> Option<Value> {
        match self {
            ParseOutcome::Parsed(value) => Some(value),
            ParseOutcome::Unparsed(_) => None,
        }
    }
}

/// Canonical language tag for a fence label or language name
pub fn canonical_language(tag: &str) -> String {
    let lower = tag.trim().to_ascii_lowercase();
    let canonical = match lower.as_str() {
        "py" | "python3" | "py3" => "python",
        "rs" => "rust",
        "js" | "jsx" | "mjs" | "node" => "javascript",
        "ts" | "tsx" => "typescript",
        "golang" => "go",
        "rb" => "ruby",
        "sh" | "shell" | "zsh" => "bash",
        "yml" => "yaml",
        "c++" | "cc" | "cxx" | "hpp" => "cpp",
        "cs" | "c#" => "csharp",
        "kt" | "kts" => "kotlin",
        "md" => "markdown",
        _ => return lower,
    };
    canonical.to_string()
}

/// Extracts the code body from a generation response
///
/// Returns `None` if the response is empty or only prose.
pub fn extract_code(response: &str, language: Option<&str>) -> Option<String> {
    let blocks: Vec<(String, &str)> = FENCE
        .captures_iter(response)
        .filter_map(|caps| {
            let tag = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            caps.get(2).map(|body| (canonical_language(tag), body.as_str()))
        })
        .collect();

    if let Some(language) = language {
        let wanted = canonical_language(language);
        if let Some((_, body)) = blocks.iter().find(|(tag, _)| *tag == wanted) {
            return normalize_code(body);
        }
    }

    if let Some((_, body)) = blocks.first() {
        return normalize_code(body);
    }

    strip_prose(response)
}

/// Strips prose marker lines from the start and end of a raw response
fn strip_prose(response: &str) -> Option<String> {
    let lines: Vec<&str> = response.lines().collect();

    let mut start = 0;
    while start < lines.len() {
        let line = lines[start].trim();
        if line.is_empty() || LEADING_PROSE.is_match(line) {
            start += 1;
        } else {
            break;
        }
    }

    let mut end = lines.len();
    while end > start {
        let line = lines[end - 1].trim();
        if line.is_empty() || TRAILING_PROSE.is_match(line) || LEADING_PROSE.is_match(line) {
            end -= 1;
        } else {
            break;
        }
    }

    normalize_code(&lines[start..end].join("\n"))
}

/// Drops leading blank lines and ends the body with exactly one newline
fn normalize_code(body: &str) -> Option<String> {
    let trimmed = body.trim_end();
    let start = trimmed
        .char_indices()
        .find(|(_, c)| !c.is_whitespace())
        .map(|(i, _)| trimmed[..i].rfind('\n').map_or(0, |nl| nl + 1))?;

    Some(format!("{}\n", &trimmed[start..]))
}

/// Parses a JSON object out of a free-form response
pub fn parse_json_response(text: &str) -> ParseOutcome {
    if let Some(value) = parse_stages(text) {
        return ParseOutcome::Parsed(value);
    }

    let repaired = repair_json(text);
    if repaired != text {
        if let Some(value) = parse_stages(&repaired) {
            tracing::debug!("Parsed response after JSON repair");
            return ParseOutcome::Parsed(value);
        }
    }

    if text.trim().is_empty() {
        ParseOutcome::Unparsed("empty response".to_string())
    } else {
        ParseOutcome::Unparsed("no JSON object found in response".to_string())
    }
}

fn parse_stages(text: &str) -> Option<Value> {
    for caps in JSON_FENCE.captures_iter(text) {
        if let Some(body) = caps.get(1) {
            if let Ok(value) = serde_json::from_str::<Value>(body.as_str().trim()) {
                return Some(value);
            }
        }
    }

    scan_balanced_objects(text)
}

/// Tries each `{` in turn and parses the balanced object that follows it
fn scan_balanced_objects(text: &str) -> Option<Value> {
    let bytes = text.as_bytes();
    for (start, _) in text.match_indices('{') {
        let Some(end) = balanced_end(bytes, start) else {
            continue;
        };
        if let Ok(value) = serde_json::from_str::<Value>(&text[start..=end]) {
            if value.is_object() {
                return Some(value);
            }
        }
    }
    None
}

fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// Fixes the common ways models break JSON
///
/// Single-quoted strings become double-quoted, bare keys are quoted and
/// trailing commas before a closing bracket are dropped.
pub fn repair_json(text: &str) -> String {
    let requoted = SINGLE_QUOTED.replace_all(text, |caps: &regex::Captures<'_>| {
        let inner = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        format!("\"{}\"", inner.replace("\\'", "'").replace('"', "\\\""))
    });
    let keyed = UNQUOTED_KEY.replace_all(&requoted, "$1\"$2\"$3");
    TRAILING_COMMA.replace_all(&keyed, "$1").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_prefers_language_fence() {
        let response = "Here is the code:\n```text\nnot this\n```\n```py\ndef f() -> int:\n    return 1\n```\n";
        assert_eq!(
            extract_code(response, Some("python")).unwrap(),
            "def f() -> int:\n    return 1\n"
        );
    }

    #[test]
    fn test_extract_falls_back_to_any_fence() {
        let response = "```\nfn main() {}\n```";
        assert_eq!(extract_code(response, Some("rust")).unwrap(), "fn main() {}\n");
    }

    #[test]
    fn test_extract_raw_strips_prose_markers() {
        let response = "Sure! Here is the updated file:\n\nx: int = 1\ny: int = 2\n\nDone.\n";
        assert_eq!(extract_code(response, Some("python")).unwrap(), "x: int = 1\ny: int = 2\n");
    }

    #[test]
    fn test_extract_keeps_indentation_of_first_line() {
        let response = "```python\n\n    indented = True\n```";
        assert_eq!(extract_code(response, None).unwrap(), "    indented = True\n");
    }

    #[test]
    fn test_extract_empty_and_prose_only() {
        assert_eq!(extract_code("", Some("python")), None);
        assert_eq!(extract_code("   \n\n", None), None);
        assert_eq!(extract_code("Sorry, I can't help with that.", None), None);
        assert_eq!(extract_code("```python\n```", Some("python")), None);
    }

    #[test]
    fn test_canonical_language_aliases() {
        assert_eq!(canonical_language("py"), "python");
        assert_eq!(canonical_language("RS"), "rust");
        assert_eq!(canonical_language("tsx"), "typescript");
        assert_eq!(canonical_language("haskell"), "haskell");
    }

    #[test]
    fn test_parse_fenced_json() {
        let text = "```json\n{\"key\": \"value\"}\n```";
        assert_eq!(parse_json_response(text), ParseOutcome::Parsed(json!({"key": "value"})));
    }

    #[test]
    fn test_parse_raw_json_in_prose() {
        let text = "Some text {\"key\": \"value\"} more text";
        assert_eq!(parse_json_response(text), ParseOutcome::Parsed(json!({"key": "value"})));
    }

    #[test]
    fn test_parse_skips_unbalanced_prefix() {
        let text = "Use {braces like this and then {\"a\": {\"b\": \"}\"}}";
        assert_eq!(
            parse_json_response(text),
            ParseOutcome::Parsed(json!({"a": {"b": "}"}}))
        );
    }

    #[test]
    fn test_parse_repairs_common_mistakes() {
        let text = "{summary: 'Add hints', affected_files: [{'file_path': 'a.py',},],}";
        assert_eq!(
            parse_json_response(text),
            ParseOutcome::Parsed(json!({
                "summary": "Add hints",
                "affected_files": [{"file_path": "a.py"}]
            }))
        );
    }

    #[test]
    fn test_parse_unparsable() {
        assert!(matches!(
            parse_json_response("not valid json"),
            ParseOutcome::Unparsed(_)
        ));
        assert!(matches!(parse_json_response(""), ParseOutcome::Unparsed(_)));
    }
}
