//! Structured document model and parsing
//!
//! Rich-text fields from the Jira REST API (v3) arrive as a tree of typed
//! nodes (Atlassian Document Format). This module deserializes that tree into
//! [`DocNode`] values that the [`crate::converter`] walks.
//!
//! # Tolerance
//!
//! Documents produced by newer editors regularly contain node and mark types
//! this crate does not know about. Parsing never fails because of them: an
//! unknown node type becomes [`NodeKind::Unknown`] and an unknown mark becomes
//! [`MarkKind::Unsupported`], so the converter can degrade that fragment and
//! keep converting its siblings.
//!
//! # Examples
//!
//! ```rust
//! use testcase_migrator::document::{parse_document_str, NodeKind};
//!
//! let json = r#"{"type":"doc","version":1,"content":[
//!     {"type":"paragraph","content":[{"type":"text","text":"Hello"}]},
//!     {"type":"sparkles","content":[]}
//! ]}"#;
//! let doc = parse_document_str(json).expect("valid document");
//!
//! assert_eq!(doc.kind, NodeKind::Document);
//! assert_eq!(doc.content[1].kind, NodeKind::Unknown("sparkles".to_string()));
//! ```

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::ConversionError;

/// Node type tag
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum NodeKind {
    Document,
    Paragraph,
    Heading,
    Text,
    Panel,
    Expand,
    NestedExpand,
    HardBreak,
    InlineCard,
    BlockCard,
    EmbedCard,
    Blockquote,
    BulletList,
    OrderedList,
    ListItem,
    CodeBlock,
    Rule,
    Emoji,
    Table,
    TableRow,
    TableHeader,
    TableCell,
    MediaSingle,
    MediaGroup,
    Media,
    Mention,
    Status,
    TaskList,
    TaskItem,
    /// Any type tag not listed above
    Unknown(String),
}

impl From<String> for NodeKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "doc" => NodeKind::Document,
            "paragraph" => NodeKind::Paragraph,
            "heading" => NodeKind::Heading,
            "text" => NodeKind::Text,
            "panel" => NodeKind::Panel,
            "expand" => NodeKind::Expand,
            "nestedExpand" => NodeKind::NestedExpand,
            "hardBreak" => NodeKind::HardBreak,
            "inlineCard" => NodeKind::InlineCard,
            "blockCard" => NodeKind::BlockCard,
            "embedCard" => NodeKind::EmbedCard,
            "blockquote" => NodeKind::Blockquote,
            "bulletList" => NodeKind::BulletList,
            "orderedList" => NodeKind::OrderedList,
            "listItem" => NodeKind::ListItem,
            "codeBlock" => NodeKind::CodeBlock,
            "rule" => NodeKind::Rule,
            "emoji" => NodeKind::Emoji,
            "table" => NodeKind::Table,
            "tableRow" => NodeKind::TableRow,
            "tableHeader" => NodeKind::TableHeader,
            "tableCell" => NodeKind::TableCell,
            "mediaSingle" => NodeKind::MediaSingle,
            "mediaGroup" => NodeKind::MediaGroup,
            "media" => NodeKind::Media,
            "mention" => NodeKind::Mention,
            "status" => NodeKind::Status,
            "taskList" => NodeKind::TaskList,
            "taskItem" => NodeKind::TaskItem,
            _ => NodeKind::Unknown(tag),
        }
    }
}

/// Inline style tag
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum MarkKind {
    Code,
    Em,
    Strike,
    Strong,
    Link,
    /// Any mark type this crate does not render
    Unsupported(String),
}

impl From<String> for MarkKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "code" => MarkKind::Code,
            "em" => MarkKind::Em,
            "strike" => MarkKind::Strike,
            "strong" => MarkKind::Strong,
            "link" => MarkKind::Link,
            _ => MarkKind::Unsupported(tag),
        }
    }
}

impl MarkKind {
    /// Source type tag, used in warnings
    pub fn tag(&self) -> &str {
        match self {
            MarkKind::Code => "code",
            MarkKind::Em => "em",
            MarkKind::Strike => "strike",
            MarkKind::Strong => "strong",
            MarkKind::Link => "link",
            MarkKind::Unsupported(tag) => tag,
        }
    }
}

/// Inline style annotation on a text node
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Mark {
    #[serde(rename = "type")]
    pub kind: MarkKind,
    #[serde(default)]
    pub attrs: Map<String, Value>,
}

impl Mark {
    /// Create a mark without attributes
    pub fn new(kind: MarkKind) -> Self {
        Self {
            kind,
            attrs: Map::new(),
        }
    }

    /// Create a link mark pointing at `href`
    pub fn link(href: &str) -> Self {
        let mut attrs = Map::new();
        attrs.insert("href".to_string(), Value::String(href.to_string()));
        Self {
            kind: MarkKind::Link,
            attrs,
        }
    }

    /// Link target, if this mark carries one
    pub fn href(&self) -> Option<&str> {
        self.attrs.get("href").and_then(Value::as_str)
    }
}

/// A node of the structured document tree
///
/// `marks` keeps the source order: it decides the nesting order of Markdown
/// delimiters (see [`crate::marks::apply_marks`]).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DocNode {
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default)]
    pub attrs: Map<String, Value>,
    #[serde(default)]
    pub content: Vec<DocNode>,
    #[serde(default)]
    pub marks: Vec<Mark>,
    #[serde(default)]
    pub text: Option<String>,
}

impl DocNode {
    /// Create a node with children and no attributes
    pub fn new(kind: NodeKind, content: Vec<DocNode>) -> Self {
        Self {
            kind,
            attrs: Map::new(),
            content,
            marks: Vec::new(),
            text: None,
        }
    }

    /// Create a text leaf
    pub fn text(text: &str, marks: Vec<Mark>) -> Self {
        Self {
            kind: NodeKind::Text,
            attrs: Map::new(),
            content: Vec::new(),
            marks,
            text: Some(text.to_string()),
        }
    }

    /// Builder: set one attribute
    pub fn with_attr(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attrs.insert(key.to_string(), value.into());
        self
    }

    /// String attribute lookup
    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(Value::as_str)
    }

    /// Unsigned integer attribute lookup
    pub fn attr_u64(&self, key: &str) -> Option<u64> {
        self.attrs.get(key).and_then(Value::as_u64)
    }

    /// Concatenated raw text of all descendant text leaves, marks ignored
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        if let Some(text) = &self.text {
            out.push_str(text);
        }
        for child in &self.content {
            child.collect_text(out);
        }
    }
}

/// Parse a structured document from an already-decoded JSON value
///
/// # Errors
///
/// Returns `ConversionError::ParseError` if the value is not an object with a
/// `type` tag, or if a node has malformed fields (e.g. `content` that is not a
/// list).
pub fn parse_document(value: &Value) -> Result<DocNode, ConversionError> {
    if !value.is_object() {
        return Err(ConversionError::ParseError(
            "structured document must be a JSON object".to_string(),
        ));
    }
    DocNode::deserialize(value).map_err(|e| ConversionError::ParseError(e.to_string()))
}

/// Parse a structured document from JSON text
///
/// # Errors
///
/// Returns `ConversionError::InvalidInput` for empty input and
/// `ConversionError::ParseError` for malformed JSON.
pub fn parse_document_str(json: &str) -> Result<DocNode, ConversionError> {
    if json.trim().is_empty() {
        return Err(ConversionError::InvalidInput(
            "document input is empty".to_string(),
        ));
    }
    let value: Value =
        serde_json::from_str(json).map_err(|e| ConversionError::ParseError(e.to_string()))?;
    parse_document(&value)
}
