//! Text processing utilities.

/// Check that a window of text contains something beyond whitespace.
pub fn has_content(content: &str) -> bool {
    content.chars().any(|c| !c.is_whitespace())
}

/// Truncate `text` to at most `budget` characters without splitting a
/// multi-byte character, appending an ellipsis when anything was cut.
pub fn truncate_preview(text: &str, budget: usize) -> String {
    if text.chars().count() <= budget {
        return text.to_string();
    }
    let mut preview: String = text.chars().take(budget).collect();
    preview.push_str("...");
    preview
}
