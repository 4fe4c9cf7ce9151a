use serde_json::{json, Value};

/// Extract plain text from Jira's Atlassian Document Format (ADF).
pub fn extract_text_from_adf(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(arr) => {
            let parts: Vec<String> = arr.iter().filter_map(extract_text_from_adf).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(" "))
            }
        }
        Value::Object(obj) => {
            if obj.get("type").and_then(|v| v.as_str()) == Some("text") {
                return obj.get("text").and_then(|v| v.as_str()).map(String::from);
            }
            if let Some(content) = obj.get("content") {
                return extract_text_from_adf(content);
            }
            None
        }
        _ => None,
    }
}

/// Whether `value` looks like an ADF document root.
pub fn is_adf_document(value: &Value) -> bool {
    value.get("type").and_then(|v| v.as_str()) == Some("doc")
}

/// Wrap plain text in a single-paragraph ADF document (v3 worklog comments).
pub fn paragraph(text: &str) -> Value {
    json!({
        "type": "doc",
        "version": 1,
        "content": [{
            "type": "paragraph",
            "content": [{ "type": "text", "text": text }]
        }]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paragraph_round_trips_through_extract() {
        let doc = paragraph("Imported from calendar");
        assert!(is_adf_document(&doc));
        assert_eq!(
            extract_text_from_adf(&doc).as_deref(),
            Some("Imported from calendar")
        );
    }

    #[test]
    fn extract_joins_paragraphs() {
        let doc = json!({
            "type": "doc",
            "content": [
                { "type": "paragraph", "content": [{ "type": "text", "text": "one" }] },
                { "type": "paragraph", "content": [{ "type": "text", "text": "two" }] }
            ]
        });
        assert_eq!(extract_text_from_adf(&doc).as_deref(), Some("one two"));
        assert!(!is_adf_document(&json!("plain")));
    }
}
