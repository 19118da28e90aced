//! Lenient JSON extraction from model output text.
//!
//! Vision models asked for JSON frequently wrap it in a fenced code block or
//! surround it with prose. Tried in order:
//!
//! 1. The whole response as JSON
//! 2. ` ```json ` (or bare ` ``` `) fenced blocks
//! 3. The first balanced `{ ... }` span in the text

use serde_json::Value;

/// Extract the JSON object a model returned, if any
pub fn extract_json(response: &str) -> Option<Value> {
    let trimmed = response.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed)
        && value.is_object()
    {
        return Some(value);
    }

    let mut in_block = false;
    let mut block = String::new();
    for line in response.lines() {
        let line_trimmed = line.trim();
        if !in_block && line_trimmed.starts_with("```") {
            in_block = true;
            block.clear();
        } else if in_block && line_trimmed == "```" {
            in_block = false;
            if let Ok(value) = serde_json::from_str::<Value>(&block)
                && value.is_object()
            {
                return Some(value);
            }
        } else if in_block {
            block.push_str(line);
            block.push('\n');
        }
    }

    balanced_object(trimmed).and_then(|span| serde_json::from_str(span).ok())
}

/// Find the first brace-balanced span, skipping braces inside strings
fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
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
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
