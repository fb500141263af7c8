//! Description field conversion
//!
//! A Jira description is either wiki markup (a JSON string) or a structured
//! document (a JSON object). Conversion problems never fail the test case: the
//! case is migrated without a description and the problem is logged.

use serde_json::Value;

use crate::converter::MarkdownConverter;
use crate::document::parse_document;
use crate::wiki_markup::wiki_to_markdown;

/// Convert a description field with a default converter
///
/// ```
/// use serde_json::json;
/// use testcase_migrator::description::convert_description;
///
/// assert_eq!(convert_description(&json!("*bold*")).as_deref(), Some("**bold**"));
/// assert_eq!(convert_description(&json!(null)), None);
/// ```
pub fn convert_description(value: &Value) -> Option<String> {
    convert_description_with(&MarkdownConverter::new(), value)
}

/// Convert a description field with the given converter
pub fn convert_description_with(converter: &MarkdownConverter, value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) if text.trim().is_empty() => None,
        Value::String(text) => Some(wiki_to_markdown(text)),
        Value::Object(_) => {
            let converted = parse_document(value).and_then(|doc| converter.convert(&doc));
            match converted {
                Ok(converted) => {
                    if !converted.warnings.is_empty() {
                        tracing::info!(
                            warnings = converted.warnings.len(),
                            "description converted with degraded fragments"
                        );
                    }
                    Some(converted.markdown).filter(|markdown| !markdown.is_empty())
                }
                Err(e) => {
                    tracing::warn!(error = %e, code = e.code(), "description conversion failed");
                    None
                }
            }
        }
        other => {
            tracing::warn!(kind = ?other, "description is neither text nor a document");
            None
        }
    }
}
