//! Integration tests for cooperative timeout mechanism
//!
//! These tests verify that the timeout mechanism correctly aborts conversion
//! operations that exceed the configured timeout limit.

use proptest::prelude::*;
use serde_json::{Value, json};
use std::time::Duration;
use testcase_migrator::converter::{ConversionContext, ConversionOptions, MarkdownConverter};
use testcase_migrator::document::{DocNode, parse_document};
use testcase_migrator::error::ConversionError;

fn paragraphs(count: usize) -> DocNode {
    let content: Vec<Value> = (0..count)
        .map(|i| json!({"type": "paragraph", "content": [{"type": "text", "text": format!("Paragraph {i}")}]}))
        .collect();
    parse_document(&json!({"type": "doc", "content": content})).expect("Parse failed")
}

fn title_and_content() -> DocNode {
    parse_document(&json!({
        "type": "doc",
        "content": [
            {"type": "heading", "attrs": {"level": 1}, "content": [{"type": "text", "text": "Title"}]},
            {"type": "paragraph", "content": [{"type": "text", "text": "Content"}]}
        ]
    }))
    .expect("Parse failed")
}

/// Test that conversion succeeds with no timeout (Duration::ZERO)
#[test]
fn test_no_timeout() {
    let doc = title_and_content();
    let converter = MarkdownConverter::new();

    let mut ctx = ConversionContext::new(Duration::ZERO);
    let result = converter.convert_with_context(&doc, &mut ctx);

    let converted = result.expect("conversion without timeout");
    assert!(converted.markdown.contains("# Title"));
}

/// Test that conversion succeeds with generous timeout
#[test]
fn test_generous_timeout() {
    let doc = title_and_content();
    let converter = MarkdownConverter::new();

    let mut ctx = ConversionContext::new(Duration::from_secs(10));
    let converted = converter
        .convert_with_context(&doc, &mut ctx)
        .expect("conversion within timeout");
    assert!(converted.markdown.contains("# Title"));
}

/// Test that timeout is detected with very short timeout
#[test]
fn test_timeout_detection() {
    let doc = paragraphs(10_000);
    let converter = MarkdownConverter::new();

    // 1 microsecond, already exceeded by the time the first checkpoint runs
    let mut ctx = ConversionContext::new(Duration::from_micros(1));
    std::thread::sleep(Duration::from_millis(1));

    match converter.convert_with_context(&doc, &mut ctx) {
        Err(ConversionError::Timeout) => {}
        Err(e) => panic!("Expected Timeout error, got: {:?}", e),
        Ok(_) => panic!("Expected timeout, but conversion succeeded"),
    }
}

/// Timeout configured through options applies to `convert`
#[test]
fn test_timeout_from_options() {
    let converter = MarkdownConverter::with_options(ConversionOptions {
        timeout: Duration::from_nanos(1),
        ..Default::default()
    });
    let doc = paragraphs(5_000);
    assert!(matches!(converter.convert(&doc), Err(ConversionError::Timeout)));
    assert_eq!(ConversionError::Timeout.code(), 3);
}

/// Test that ConversionContext tracks node count
#[test]
fn test_node_count_tracking() {
    let doc = paragraphs(2);
    let converter = MarkdownConverter::new();

    let mut ctx = ConversionContext::new(Duration::from_secs(10));
    let _ = converter.convert_with_context(&doc, &mut ctx);

    // doc + 2 paragraphs + 2 text leaves
    assert_eq!(ctx.node_count(), 5);
}

/// Test that elapsed time is tracked
#[test]
fn test_elapsed_time_tracking() {
    let doc = title_and_content();
    let converter = MarkdownConverter::new();

    let mut ctx = ConversionContext::new(Duration::from_secs(10));
    std::thread::sleep(Duration::from_millis(10));

    let _ = converter.convert_with_context(&doc, &mut ctx);
    assert!(ctx.elapsed() >= Duration::from_millis(10));
}

/// Test that timeout checking happens at checkpoints (every 100 nodes)
#[test]
fn test_checkpoint_frequency() {
    let doc = paragraphs(250);
    let converter = MarkdownConverter::new();

    let mut ctx = ConversionContext::new(Duration::from_secs(5));
    let result = converter.convert_with_context(&doc, &mut ctx);

    assert!(result.is_ok());
    assert!(ctx.node_count() > 100);
}

proptest! {
    /// Cooperative timeout fires at the first checkpoint once exceeded
    #[test]
    fn prop_cooperative_timeout_enforced_at_checkpoints(node_increments in 0u32..220) {
        let mut ctx = ConversionContext::new(Duration::from_nanos(1));
        std::thread::sleep(Duration::from_millis(1));

        let mut first_err_at: Option<u32> = None;
        for step in 1..=node_increments {
            if ctx.increment_and_check().is_err() {
                first_err_at = Some(step);
                break;
            }
        }

        if node_increments < 100 {
            prop_assert_eq!(
                first_err_at, None,
                "Cooperative timeout should not trigger before the first 100-node checkpoint"
            );
        } else {
            prop_assert_eq!(
                first_err_at, Some(100),
                "Timeout should trigger at the first checkpoint once already exceeded"
            );
        }
    }
}
