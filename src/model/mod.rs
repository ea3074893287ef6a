//! Domain records produced by the crawler
//!
//! - `Category`: closed set of classification codes partitioning the corpus
//! - `Policy`: one listed record, mapped from a raw search row
//! - `PolicyDetail`: a policy plus its detail payload and attachments
//! - `Attachment`: one downloadable file of a policy

mod category;
mod policy;

pub use category::Category;
pub use policy::{Attachment, Policy, PolicyDetail};

use serde_json::Value;

/// Reads a string-ish field from a raw JSON object
///
/// Numbers are rendered as text; missing, null and structured values give an
/// empty string.
pub(crate) fn text_field(row: &Value, key: &str) -> String {
    match row.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// Makes `raw` safe to use as a single path component
///
/// Path separators and characters rejected by common filesystems become
/// `_`, surrounding dots and whitespace are trimmed, and the result is cut to
/// `max_chars` characters. An empty result becomes `untitled`.
pub fn safe_file_name(raw: &str, max_chars: usize) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .take(max_chars)
        .collect();

    let trimmed = cleaned.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_field_kinds() {
        let row = json!({ "s": "a", "n": 7, "b": true, "o": {}, "z": null });
        assert_eq!(text_field(&row, "s"), "a");
        assert_eq!(text_field(&row, "n"), "7");
        assert_eq!(text_field(&row, "b"), "true");
        assert_eq!(text_field(&row, "o"), "");
        assert_eq!(text_field(&row, "z"), "");
        assert_eq!(text_field(&row, "missing"), "");
    }

    #[test]
    fn test_safe_file_name() {
        assert_eq!(safe_file_name("a/b:c?.docx", 80), "a_b_c_.docx");
        assert_eq!(safe_file_name("  ..  ", 80), "untitled");
        assert_eq!(safe_file_name("关于水资源管理的规定", 4), "关于水资");
    }
}
