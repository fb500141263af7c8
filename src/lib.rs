//! Test case migration into Testomat.io
//!
//! This library moves test repositories from Jira/Xray and TestRail into a
//! Testomat.io project: folder trees become suites, test cases become tests,
//! rich-text descriptions become Markdown and attachments are re-uploaded with
//! their references rewritten.
//!
//! # Architecture
//!
//! The library is structured into several modules:
//! - `document`: structured document (ADF) model parsed with serde
//! - `converter`: Markdown generation from a document tree
//! - `marks`: inline style marks applied to text leaves
//! - `security`: nesting depth limits and dangerous URL detection
//! - `wiki_markup`: legacy wiki markup to Markdown
//! - `description`: description field dispatch (markup or document)
//! - `hierarchy`: folder tree to suite reconciliation
//! - `priority`: source priorities to destination priorities
//! - `attachments`: attachment placeholders and reference rewriting
//! - `fingerprint`: BLAKE3 content fingerprints for upload dedup
//! - `assemble`: preconditions and steps sections of a description
//! - `http`: blocking client, write retry policy, pagination
//! - `source`: source readers (Jira, Xray, TestRail)
//! - `destination`: destination writer (Testomat.io)
//! - `migrate`: orchestration of one run
//! - `config`: configuration loaded from the environment
//!
//! # Conversion
//!
//! ```
//! use testcase_migrator::{MarkdownConverter, parse_document_str};
//!
//! let doc = parse_document_str(
//!     r#"{"type":"doc","content":[{"type":"heading","attrs":{"level":2},
//!         "content":[{"type":"text","text":"Setup"}]}]}"#,
//! )
//! .expect("valid document");
//! let converted = MarkdownConverter::new().convert(&doc).expect("converted");
//! assert_eq!(converted.markdown, "## Setup\n");
//! ```

pub mod assemble;
pub mod attachments;
pub mod config;
pub mod converter;
pub mod description;
pub mod destination;
pub mod document;
pub mod error;
pub mod fingerprint;
pub mod hierarchy;
pub mod http;
pub mod marks;
pub mod migrate;
pub mod priority;
pub mod security;
pub mod source;
pub mod wiki_markup;

// Re-export main types for convenience
pub use converter::{ConvertedDocument, MarkdownConverter};
pub use document::{DocNode, parse_document, parse_document_str};
pub use error::{ConversionError, MigrationError};
pub use hierarchy::{FolderNode, HierarchyReconciler, SuiteIdMapping};
pub use migrate::{MigrationReport, Migrator};
