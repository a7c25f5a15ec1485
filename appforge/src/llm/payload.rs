//! Locating JSON inside free-text model replies.

use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// Give up after this many candidate spans.
const MAX_CANDIDATES: usize = 64;

/// Find the first balanced `{…}` or `[…]` span in `text` that deserializes as `T`.
///
/// Models wrap JSON in prose and code fences; both are tolerated. String
/// literals are respected while matching brackets, so braces inside
/// generated source code do not end a span early.
pub fn parse_structured_payload<T: DeserializeOwned>(text: &str) -> Result<T> {
    let body = strip_code_fences(text);
    let mut last_err = None;
    let mut tried = 0;

    for (start, ch) in body.char_indices() {
        if ch != '{' && ch != '[' {
            continue;
        }
        let Some(end) = balanced_end(&body[start..]) else {
            continue;
        };
        tried += 1;
        match serde_json::from_str::<T>(&body[start..start + end]) {
            Ok(value) => return Ok(value),
            Err(e) => last_err = Some(e.to_string()),
        }
        if tried >= MAX_CANDIDATES {
            break;
        }
    }

    Err(Error::Parse(match last_err {
        Some(e) => format!("no JSON payload matched the expected shape ({e})"),
        None => "no JSON payload found in response".to_string(),
    }))
}

/// Remove a surrounding ```json fence if the reply has one.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return text;
    };
    let rest = match rest.find('\n') {
        Some(nl) => &rest[nl + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Byte length of the balanced span starting at the first char of `s`.
fn balanced_end(s: &str) -> Option<usize> {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in s.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.pop() != Some(ch) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(i + ch.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Named {
        name: String,
    }

    #[test]
    fn finds_object_inside_prose() {
        let reply = "Sure! Here is the plan:\n{\"name\": \"todo\"}\nLet me know.";
        let parsed: Named = parse_structured_payload(reply).unwrap();
        assert_eq!(parsed.name, "todo");
    }

    #[test]
    fn handles_code_fences() {
        let reply = "```json\n{\"name\": \"fenced\"}\n```";
        let parsed: Named = parse_structured_payload(reply).unwrap();
        assert_eq!(parsed.name, "fenced");
    }

    #[test]
    fn braces_in_strings_do_not_break_matching() {
        let reply = r#"{"name": "function a() { return '}'; }"}"#;
        let parsed: Named = parse_structured_payload(reply).unwrap();
        assert_eq!(parsed.name, "function a() { return '}'; }");
    }

    #[test]
    fn skips_spans_with_the_wrong_shape() {
        let reply = r#"Use {braces} wisely. {"other": 1} then {"name": "second"}"#;
        let parsed: Named = parse_structured_payload(reply).unwrap();
        assert_eq!(parsed.name, "second");
    }

    #[test]
    fn parses_arrays() {
        let parsed: Vec<String> =
            parse_structured_payload("keywords: [\"todo\", \"tasks\"]").unwrap();
        assert_eq!(parsed, vec!["todo", "tasks"]);
    }

    #[test]
    fn plain_text_is_parse_error() {
        let err = parse_structured_payload::<Named>("no structure here").unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }
}
