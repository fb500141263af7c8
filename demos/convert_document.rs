//! Converts a description document to Markdown and rewrites its attachment
//! placeholders, as the migration does for every Jira-based test.
//!
//! Reads the document JSON from the file given as first argument, or uses a
//! built-in sample.

use testcase_migrator::attachments::{AttachmentRef, Substitution, pending_references, rewrite};
use testcase_migrator::{MarkdownConverter, parse_document_str};

const SAMPLE: &str = r#"{
  "type": "doc",
  "version": 1,
  "content": [
    {"type": "heading", "attrs": {"level": 2}, "content": [{"type": "text", "text": "Checkout"}]},
    {"type": "panel", "attrs": {"panelType": "warning"}, "content": [
      {"type": "paragraph", "content": [{"type": "text", "text": "Use the staging card only"}]}
    ]},
    {"type": "orderedList", "content": [
      {"type": "listItem", "content": [{"type": "paragraph", "content": [
        {"type": "text", "text": "Open "},
        {"type": "text", "text": "the cart", "marks": [{"type": "link", "attrs": {"href": "https://shop.example/cart"}}]}
      ]}]},
      {"type": "listItem", "content": [{"type": "paragraph", "content": [
        {"type": "text", "text": "Pay", "marks": [{"type": "strong"}]}
      ]}]}
    ]},
    {"type": "mediaSingle", "content": [{"type": "media", "attrs": {"alt": "cart.png"}}]}
  ]
}"#;

fn main() {
    let json = match std::env::args().nth(1) {
        Some(path) => match std::fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) => {
                eprintln!("cannot read {path}: {e}");
                std::process::exit(1);
            }
        },
        None => SAMPLE.to_string(),
    };

    let doc = match parse_document_str(&json) {
        Ok(doc) => doc,
        Err(e) => {
            eprintln!("invalid document: {e}");
            std::process::exit(1);
        }
    };
    let converted = match MarkdownConverter::new().convert(&doc) {
        Ok(converted) => converted,
        Err(e) => {
            eprintln!("conversion failed (code {}): {e}", e.code());
            std::process::exit(1);
        }
    };

    println!("=== Markdown ===\n{}", converted.markdown);
    for warning in &converted.warnings {
        println!("warning: {warning:?}");
    }

    let substitutions = [Substitution::new(
        AttachmentRef::FileName("cart.png".into()),
        "https://files.example/attachments/cart.png",
        "cart.png",
        false,
    )];
    let rewritten = rewrite(&converted.markdown, &substitutions);
    println!("=== After upload ===\n{rewritten}");
    println!("unresolved id references: {}", pending_references(&rewritten).len());
}
