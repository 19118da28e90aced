//! String utilities for the domain layer.

/// Truncate a string to a maximum length with ellipsis (UTF-8 safe)
///
/// Used to keep raw model output and prior values short when they are
/// echoed back into retry prompts and audit records.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        let target = max_len.saturating_sub(3);
        let mut end = target.min(s.len());
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_ascii() {
        assert_eq!(truncate("shelf", 10), "shelf");
        assert_eq!(truncate("total_shelves", 8), "total...");
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        // 'é' is two bytes; cutting inside it must back off
        assert_eq!(truncate("caféé", 6), "caf...");
        assert_eq!(truncate("€€€", 9), "€€€");
    }
}
