//! Description pipeline tests
//!
//! Source description (document or wiki markup) to Markdown, then attachment
//! placeholders to uploaded URLs, the way a migrated Jira test goes through it.

use serde_json::{Value, json};
use testcase_migrator::attachments::{AttachmentRef, Substitution, pending_references, rewrite};
use testcase_migrator::description::convert_description;

fn text(t: &str) -> Value {
    json!({"type": "text", "text": t})
}

fn paragraph(t: &str) -> Value {
    json!({"type": "paragraph", "content": [text(t)]})
}

fn cell(kind: &str, t: &str) -> Value {
    json!({"type": kind, "content": [paragraph(t)]})
}

fn jira_description() -> Value {
    json!({
        "type": "doc",
        "version": 1,
        "content": [
            {"type": "heading", "attrs": {"level": 3}, "content": [text("Setup")]},
            {"type": "paragraph", "content": [
                text("Log in as "),
                {"type": "text", "text": "admin", "marks": [{"type": "code"}]}
            ]},
            {"type": "bulletList", "content": [
                {"type": "listItem", "content": [paragraph("Open cart")]},
                {"type": "listItem", "content": [paragraph("Pay")]}
            ]},
            {"type": "mediaSingle", "content": [
                {"type": "media", "attrs": {"id": "9f1", "type": "file", "alt": "cart.png"}}
            ]},
            {"type": "table", "content": [
                {"type": "tableRow", "content": [cell("tableHeader", "Card"), cell("tableHeader", "Result")]},
                {"type": "tableRow", "content": [cell("tableCell", "4242"), cell("tableCell", "Accepted")]}
            ]}
        ]
    })
}

#[test]
fn test_document_description_end_to_end() {
    let markdown = convert_description(&jira_description()).expect("description");
    assert_eq!(
        markdown,
        "### Setup\n\n\
         Log in as `admin`\n\n  \
         * Open cart\n  \
         * Pay\n\n\
         ![](cart.png)\n\n\
         |Card|Result|\n|:---|:---|\n|4242|Accepted|\n"
    );

    let substitutions = [Substitution::new(
        AttachmentRef::FileName("cart.png".into()),
        "https://files.example/cart",
        "cart.png",
        false,
    )];
    let rewritten = rewrite(&markdown, &substitutions);
    assert!(rewritten.contains("![](https://files.example/cart)"));
    assert!(!rewritten.contains("![](cart.png)"));
}

#[test]
fn test_wiki_description_end_to_end() {
    let markdown =
        convert_description(&json!("h2. Steps\n# Open *cart*\n# Attach !receipt.pdf!")).expect("description");
    assert_eq!(markdown, "## Steps\n1. Open **cart**\n1. Attach ![](receipt.pdf)");

    let substitutions = [Substitution::new(
        AttachmentRef::FileName("receipt.pdf".into()),
        "https://files.example/r",
        "receipt.pdf",
        false,
    )];
    assert_eq!(
        rewrite(&markdown, &substitutions),
        "## Steps\n1. Open **cart**\n1. Attach [receipt.pdf](https://files.example/r)"
    );
}

#[test]
fn test_unknown_nodes_degrade_without_losing_the_rest() {
    let doc = json!({"type": "doc", "content": [
        paragraph("before"),
        {"type": "someFutureNode", "content": [paragraph("ignored?")]},
        paragraph("after")
    ]});
    let markdown = convert_description(&doc).expect("description");
    assert!(markdown.starts_with("before\n\n"));
    assert!(markdown.trim_end().ends_with("after"));
}

#[test]
fn test_id_references_are_swept_after_conversion() {
    let markdown = "A ![](index.php?/attachments/get/12) B !xray-attachment://7|width=10! C ![](/api/v2/get_attachment/12)";
    assert_eq!(
        pending_references(markdown),
        vec![
            AttachmentRef::TestRailId("12".into()),
            AttachmentRef::XrayId("7".into()),
        ]
    );
}
