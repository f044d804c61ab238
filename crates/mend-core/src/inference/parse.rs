//! Defensive helpers for reading model output.

/// Strip a surrounding markdown code fence (with or without a language tag).
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (`json`, `text`, ...) on the opening line.
    let body = match rest.find('\n') {
        Some(newline) if !rest[..newline].contains('`') => &rest[newline + 1..],
        _ => rest,
    };
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Extract the first balanced `open`/`close` fragment, ignoring delimiters
/// inside JSON strings.
pub fn extract_json_fragment(text: &str, open: char, close: char) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;
    let mut start_idx = None;

    for (i, c) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        if c == '\\' && in_string {
            escape_next = true;
            continue;
        }
        if c == '"' {
            in_string = !in_string;
            continue;
        }
        if in_string {
            continue;
        }

        if c == open {
            if depth == 0 {
                start_idx = Some(i);
            }
            depth += 1;
        } else if c == close && depth > 0 {
            depth -= 1;
            if depth == 0 {
                if let Some(start) = start_idx {
                    return Some(&text[start..i + c.len_utf8()]);
                }
            }
        }
    }

    None
}

/// Parse a JSON value of the given shape out of a model response.
///
/// Tries the fence-stripped text as-is first, then the first balanced
/// fragment delimited by `open`/`close`.
pub fn parse_json_response(text: &str, open: char, close: char) -> Option<serde_json::Value> {
    let clean = strip_code_fences(text);
    if let Ok(value) = serde_json::from_str(clean) {
        return Some(value);
    }
    let fragment = extract_json_fragment(clean, open, close)?;
    serde_json::from_str(fragment).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_fences_with_language() {
        assert_eq!(strip_code_fences("```json\n[1, 2]\n```"), "[1, 2]");
        assert_eq!(strip_code_fences("```\nAPPROVED\n```"), "APPROVED");
        assert_eq!(strip_code_fences("  plain  "), "plain");
    }

    #[test]
    fn test_strip_fences_single_line() {
        assert_eq!(strip_code_fences("```APPROVED```"), "APPROVED");
    }

    #[test]
    fn test_extract_fragment_ignores_brackets_in_strings() {
        let text = r#"Here you go: [{"message": "expected ] got ["}] thanks"#;
        assert_eq!(
            extract_json_fragment(text, '[', ']'),
            Some(r#"[{"message": "expected ] got ["}]"#)
        );
        assert_eq!(extract_json_fragment("no json", '{', '}'), None);
    }

    #[test]
    fn test_parse_json_response_falls_back_to_fragment() {
        let value = parse_json_response("Sure!\n{\"category\": \"TYPE_ERROR\"}", '{', '}').unwrap();
        assert_eq!(value["category"], "TYPE_ERROR");
        assert!(parse_json_response("not json at all", '{', '}').is_none());
    }
}
