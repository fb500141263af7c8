//! Security validation tests
//!
//! Descriptions come from systems anyone in the source project can edit, so
//! the converter must not turn hostile link targets into clickable Markdown
//! and must refuse documents nested deeply enough to exhaust the stack.

use serde_json::{Value, json};
use testcase_migrator::converter::{ConversionOptions, ConversionWarning, MarkdownConverter};
use testcase_migrator::document::parse_document;
use testcase_migrator::error::ConversionError;

fn convert(doc: Value) -> (String, Vec<ConversionWarning>) {
    let doc = parse_document(&doc).expect("Failed to parse document");
    let converted = MarkdownConverter::new()
        .convert(&doc)
        .expect("Failed to convert");
    (converted.markdown, converted.warnings)
}

fn linked_text(text: &str, href: &str) -> Value {
    json!({
        "type": "doc",
        "content": [{
            "type": "paragraph",
            "content": [
                {"type": "text", "text": "Before "},
                {"type": "text", "text": text, "marks": [{"type": "link", "attrs": {"href": href}}]},
                {"type": "text", "text": " after"}
            ]
        }]
    })
}

fn card(kind: &str, url: &str) -> Value {
    json!({"type": "doc", "content": [{"type": "paragraph", "content": [{"type": kind, "attrs": {"url": url}}]}]})
}

#[test]
fn test_javascript_url_in_link() {
    let (markdown, warnings) = convert(linked_text("Click", "javascript:alert('xss')"));
    assert!(!markdown.contains("javascript:"));
    assert!(markdown.contains("Before Click after"));
    assert_eq!(
        warnings,
        vec![ConversionWarning::UnsafeUrl("javascript:alert('xss')".into())]
    );
}

#[test]
fn test_javascript_url_case_insensitive() {
    for href in ["JavaScript:alert(1)", "JAVASCRIPT:alert(1)", "  javascript:alert(1)"] {
        let (markdown, _) = convert(linked_text("x", href));
        assert!(
            !markdown.to_lowercase().contains("javascript:"),
            "{href} should be dropped, got {markdown}"
        );
    }
}

#[test]
fn test_data_url_in_link() {
    let (markdown, warnings) = convert(linked_text("img", "data:text/html,<script>alert(1)</script>"));
    assert!(!markdown.contains("data:"));
    assert!(!markdown.contains("<script>"));
    assert_eq!(warnings.len(), 1);
}

#[test]
fn test_vbscript_and_file_urls_blocked() {
    for href in ["vbscript:msgbox(1)", "file:///etc/passwd"] {
        let (markdown, warnings) = convert(linked_text("x", href));
        assert!(!markdown.contains(href));
        assert!(matches!(warnings.as_slice(), [ConversionWarning::UnsafeUrl(_)]));
    }
}

#[test]
fn test_safe_urls_preserved() {
    let (markdown, warnings) = convert(linked_text("Docs", "https://example.com/docs?a=1"));
    assert!(markdown.contains("[Docs](https://example.com/docs?a=1)"));
    assert!(warnings.is_empty());

    let (markdown, _) = convert(linked_text("Mail", "mailto:qa@example.com"));
    assert!(markdown.contains("[Mail](mailto:qa@example.com)"));
}

#[test]
fn test_dangerous_cards_dropped() {
    for kind in ["inlineCard", "blockCard", "embedCard"] {
        let (markdown, warnings) = convert(card(kind, "javascript:alert(1)"));
        assert!(!markdown.contains("javascript"), "{kind}: {markdown}");
        assert_eq!(warnings.len(), 1);
    }

    let (markdown, _) = convert(card("inlineCard", "https://example.com/issue/1"));
    assert!(markdown.contains("[https://example.com/issue/1](https://example.com/issue/1)"));
}

#[test]
fn test_sanitization_can_be_disabled() {
    let converter = MarkdownConverter::with_options(ConversionOptions {
        sanitize_urls: false,
        ..Default::default()
    });
    let doc = parse_document(&linked_text("x", "javascript:void(0)")).expect("parse");
    let converted = converter.convert(&doc).expect("convert");
    assert!(converted.markdown.contains("[x](javascript:void(0))"));
    assert!(converted.warnings.is_empty());
}

/// Nested blockquotes around a paragraph, `levels` deep
fn nested(levels: usize) -> Value {
    let mut node = json!({"type": "paragraph", "content": [{"type": "text", "text": "deep"}]});
    for _ in 0..levels {
        node = json!({"type": "blockquote", "content": [node]});
    }
    json!({"type": "doc", "content": [node]})
}

#[test]
fn test_deeply_nested_document_rejected() {
    let converter = MarkdownConverter::with_options(ConversionOptions {
        max_depth: 50,
        ..Default::default()
    });

    let shallow = parse_document(&nested(10)).expect("parse");
    assert!(converter.convert(&shallow).is_ok());

    let deep = parse_document(&nested(100)).expect("parse");
    match converter.convert(&deep) {
        Err(ConversionError::InvalidInput(message)) => assert!(message.contains("depth")),
        other => panic!("Expected InvalidInput, got {other:?}"),
    }
}

#[test]
fn test_text_is_not_interpreted_as_html() {
    let (markdown, _) = convert(json!({
        "type": "doc",
        "content": [{"type": "paragraph", "content": [{"type": "text", "text": "<b>bold</b> & more"}]}]
    }));
    assert_eq!(markdown, "<b>bold</b> & more\n");
}

