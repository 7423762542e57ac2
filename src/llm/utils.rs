use crate::error::{PipelineError, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Drops markdown code fences (```` ```json ```` / ```` ``` ````) the provider
/// may wrap around its answer.
pub fn strip_code_fences(raw: &str) -> String {
    raw.replace("```json", "")
        .replace("```JSON", "")
        .replace("```", "")
}

/// Byte offset just past the `}` closing the object that opens at `start`.
fn balanced_object_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(start + i + c.len_utf8());
                }
            }
            _ => {}
        }
    }

    None
}

/// First well-formed JSON object embedded in `raw`, ignoring commentary and
/// code fences around it.
pub fn extract_json_object(raw: &str) -> Option<Value> {
    let cleaned = strip_code_fences(raw);
    let mut search_from = 0;

    while let Some(offset) = cleaned[search_from..].find('{') {
        let start = search_from + offset;
        if let Some(end) = balanced_object_end(&cleaned, start) {
            if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(&cleaned[start..end]) {
                return Some(value);
            }
        }
        search_from = start + 1;
    }

    None
}

pub fn parse_structured<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let value = extract_json_object(raw).ok_or_else(|| {
        PipelineError::Upstream("No JSON object found in provider response".to_string())
    })?;

    serde_json::from_value(value)
        .map_err(|e| PipelineError::Upstream(format!("Provider response did not match schema: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_from_code_fence() {
        let raw = "Here you go:\n```json\n{\"summary\": \"ok\", \"n\": 1}\n```\nThanks!";
        let value = extract_json_object(raw).unwrap();
        assert_eq!(value["summary"], "ok");
        assert_eq!(value["n"], 1);
    }

    #[test]
    fn test_braces_inside_strings_do_not_confuse_scan() {
        let raw = r#"Note {not json}. {"summary": "use {braces} and \"quotes\"", "x": {"y": 2}}"#;
        let value = extract_json_object(raw).unwrap();
        assert_eq!(value["summary"], "use {braces} and \"quotes\"");
        assert_eq!(value["x"]["y"], 2);
    }

    #[test]
    fn test_no_object() {
        assert!(extract_json_object("I cannot help with that.").is_none());
        assert!(extract_json_object("{\"unterminated\": true").is_none());
        assert!(parse_structured::<Value>("nothing here").is_err());
    }
}
