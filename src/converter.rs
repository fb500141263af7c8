//! Markdown converter - transforms a structured document tree to Markdown
//!
//! This module provides the core conversion logic for rich-text fields fetched
//! from source systems. The input is a [`DocNode`] tree (see
//! [`crate::document`]); the output is a single CommonMark-compatible string
//! using the table and list conventions the destination renderer expects.
//!
//! # Conversion Strategy
//!
//! The converter performs a post-order recursive descent keyed on the node
//! kind. Each node is converted to a string fragment from the fragments of its
//! children, and the parent decides how to join them:
//!
//! 1. **Block containers** (document, panel, expand) join children with a
//!    blank line
//! 2. **Inline containers** (paragraph, heading, table cells) join children
//!    with nothing
//! 3. **Lists** render one line per item; the item marker comes from an
//!    explicit [`ListContext`] handed down by the enclosing list
//! 4. **Text leaves** apply their marks through [`crate::marks`]
//!
//! # Graceful Degradation
//!
//! One broken description must never block the migration of the other test
//! cases. An unknown node kind converts to an empty fragment and records a
//! [`ConversionWarning`]; its siblings still convert. Only structural limits
//! (nesting depth, the optional timeout) abort a conversion.
//!
//! # Examples
//!
//! ## Headings and Marks
//!
//! Input document:
//! ```json
//! {"type": "doc", "content": [
//!   {"type": "heading", "attrs": {"level": 2}, "content": [{"type": "text", "text": "Login"}]},
//!   {"type": "paragraph", "content": [
//!     {"type": "text", "text": "Use "},
//!     {"type": "text", "text": "admin", "marks": [{"type": "code"}]}
//!   ]}
//! ]}
//! ```
//!
//! Output Markdown:
//! ```markdown
//! ## Login
//!
//! Use `admin`
//! ```
//!
//! ## Tables
//!
//! A row holding N header cells is followed by a separator of N cells:
//! ```markdown
//! |Step|Expected|
//! |:---|:---|
//! |Open page|Page loads|
//! ```
//!
//! ## Attachments
//!
//! A `media` node renders as `![](<alt>)`. The alt text holds the attachment
//! file name, which [`crate::attachments`] later replaces with the uploaded
//! URL.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use crate::document::{DocNode, NodeKind};
use crate::error::ConversionError;
use crate::marks::apply_marks_with_validator;
use crate::security::SecurityValidator;

/// Separator cell emitted after a row holding header cells
const SEPARATOR_CELL: &str = "|:---";

/// Conversion options
#[derive(Debug, Clone)]
pub struct ConversionOptions {
    /// Maximum duration of one conversion (`Duration::ZERO` means no limit)
    pub timeout: Duration,
    /// Maximum node nesting depth
    pub max_depth: usize,
    /// Drop links whose target uses a dangerous scheme
    pub sanitize_urls: bool,
    /// Normalize blank lines, trailing whitespace and the final newline
    pub normalize_output: bool,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::ZERO,
            max_depth: 1000,
            sanitize_urls: true,
            normalize_output: true,
        }
    }
}

/// Conversion context for tracking timeout and node count
///
/// The timeout is cooperative: elapsed time is checked every 100 nodes, at
/// the end of the traversal and after normalization. There are no background
/// threads, so a conversion that has exceeded its budget is only detected at
/// the next checkpoint.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use testcase_migrator::converter::ConversionContext;
///
/// let ctx = ConversionContext::new(Duration::from_secs(5));
/// assert!(ctx.check_timeout().is_ok());
/// ```
#[derive(Debug)]
pub struct ConversionContext {
    /// Start time of conversion
    start_time: Instant,
    /// Timeout duration (0 means no timeout)
    timeout: Duration,
    /// Number of nodes processed (for checkpoint frequency)
    node_count: u32,
}

impl ConversionContext {
    /// Create a new conversion context with the specified timeout
    pub fn new(timeout: Duration) -> Self {
        Self {
            start_time: Instant::now(),
            timeout,
            node_count: 0,
        }
    }

    /// Check if timeout has been exceeded
    pub fn check_timeout(&self) -> Result<(), ConversionError> {
        if self.timeout.is_zero() {
            return Ok(());
        }

        if self.start_time.elapsed() > self.timeout {
            return Err(ConversionError::Timeout);
        }

        Ok(())
    }

    /// Increment node count and check timeout every 100 nodes
    ///
    /// ```rust
    /// use std::time::Duration;
    /// use testcase_migrator::converter::ConversionContext;
    ///
    /// let mut ctx = ConversionContext::new(Duration::from_secs(5));
    /// for _ in 0..1000 {
    ///     ctx.increment_and_check()?;
    /// }
    /// # Ok::<(), testcase_migrator::error::ConversionError>(())
    /// ```
    pub fn increment_and_check(&mut self) -> Result<(), ConversionError> {
        self.node_count += 1;

        if self.node_count.is_multiple_of(100) {
            self.check_timeout()?;
        }

        Ok(())
    }

    /// Elapsed time since conversion started
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Number of nodes processed so far
    pub fn node_count(&self) -> u32 {
        self.node_count
    }
}

/// Non-fatal problem found while converting
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConversionWarning {
    /// Node kind without a Markdown rendering; converted to nothing
    UnknownNode(String),
    /// Mark kind without a Markdown rendering; text left unwrapped
    UnsupportedMark(String),
    /// Link target with a dangerous scheme; link dropped
    UnsafeUrl(String),
}

/// Deduplicated, ordered set of warnings for one conversion
#[derive(Debug, Default, Clone)]
pub struct Warnings(BTreeSet<ConversionWarning>);

impl Warnings {
    /// Record a warning (duplicates are kept once)
    pub fn record(&mut self, warning: ConversionWarning) {
        self.0.insert(warning);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConversionWarning> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<ConversionWarning> {
        self.0.into_iter().collect()
    }
}

/// Result of a successful conversion
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedDocument {
    /// Markdown text
    pub markdown: String,
    /// Fragments that were degraded on the way
    pub warnings: Vec<ConversionWarning>,
}

/// Parent-list context handed to a list item
///
/// An item does not know on its own whether it is bulleted or numbered; the
/// enclosing list passes this value down with the item's position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListContext {
    /// Item of a bullet list
    Bullet,
    /// Item of an ordered list with its number
    Ordered(u64),
}

impl ListContext {
    fn marker(&self) -> String {
        match self {
            ListContext::Bullet => "*".to_string(),
            ListContext::Ordered(n) => format!("{n}."),
        }
    }
}

/// Structured document to Markdown converter
///
/// The converter holds only configuration; every call to
/// [`MarkdownConverter::convert`] is independent.
///
/// # Usage
///
/// ```rust
/// use testcase_migrator::converter::MarkdownConverter;
/// use testcase_migrator::document::parse_document_str;
///
/// let doc = parse_document_str(
///     r#"{"type":"doc","content":[{"type":"paragraph","content":[{"type":"text","text":"Hi"}]}]}"#,
/// ).expect("parse");
/// let converted = MarkdownConverter::new().convert(&doc).expect("convert");
/// assert_eq!(converted.markdown, "Hi\n");
/// ```
#[derive(Debug, Clone)]
pub struct MarkdownConverter {
    options: ConversionOptions,
    security_validator: SecurityValidator,
}

impl MarkdownConverter {
    /// Create a new converter with default options
    pub fn new() -> Self {
        Self::with_options(ConversionOptions::default())
    }

    /// Create a new converter with custom options
    pub fn with_options(options: ConversionOptions) -> Self {
        let security_validator = SecurityValidator::with_max_depth(options.max_depth);
        Self {
            options,
            security_validator,
        }
    }

    /// Convert a document tree to Markdown
    ///
    /// # Errors
    ///
    /// - `ConversionError::InvalidInput` if the tree is nested deeper than
    ///   `max_depth`
    /// - `ConversionError::Timeout` if the configured timeout is exceeded
    pub fn convert(&self, doc: &DocNode) -> Result<ConvertedDocument, ConversionError> {
        let mut ctx = ConversionContext::new(self.options.timeout);
        self.convert_with_context(doc, &mut ctx)
    }

    /// Convert a document tree with an explicit context
    pub fn convert_with_context(
        &self,
        doc: &DocNode,
        ctx: &mut ConversionContext,
    ) -> Result<ConvertedDocument, ConversionError> {
        let mut warnings = Warnings::default();
        let raw = self.convert_node(doc, 0, ctx, &mut warnings)?;

        ctx.check_timeout()?;

        let markdown = if self.options.normalize_output {
            normalize_output(&raw)
        } else {
            raw
        };

        ctx.check_timeout()?;

        for warning in warnings.iter() {
            tracing::debug!(?warning, "degraded document fragment");
        }

        Ok(ConvertedDocument {
            markdown,
            warnings: warnings.into_vec(),
        })
    }

    /// Checkpoint run on entry to every node
    fn enter(&self, depth: usize, ctx: &mut ConversionContext) -> Result<(), ConversionError> {
        ctx.increment_and_check()?;
        self.security_validator
            .validate_depth(depth)
            .map_err(ConversionError::InvalidInput)
    }

    /// Convert one node and its subtree
    fn convert_node(
        &self,
        node: &DocNode,
        depth: usize,
        ctx: &mut ConversionContext,
        warnings: &mut Warnings,
    ) -> Result<String, ConversionError> {
        self.enter(depth, ctx)?;

        let fragment = match &node.kind {
            NodeKind::Document => self.join_children(node, "\n\n", depth, ctx, warnings)?,
            NodeKind::Paragraph | NodeKind::MediaSingle => {
                self.join_children(node, "", depth, ctx, warnings)?
            }
            NodeKind::MediaGroup | NodeKind::TaskList => {
                self.join_children(node, "\n", depth, ctx, warnings)?
            }
            NodeKind::Heading => {
                let level = node.attr_u64("level").unwrap_or(1).clamp(1, 6) as usize;
                let text = self.join_children(node, "", depth, ctx, warnings)?;
                format!("{} {}", "#".repeat(level), text)
            }
            NodeKind::Text => {
                let validator = self
                    .options
                    .sanitize_urls
                    .then_some(&self.security_validator);
                apply_marks_with_validator(
                    node.text.as_deref().unwrap_or_default(),
                    &node.marks,
                    warnings,
                    validator,
                )
            }
            NodeKind::Panel => self.handle_panel(node, depth, ctx, warnings)?,
            NodeKind::Expand | NodeKind::NestedExpand => {
                self.handle_expand(node, depth, ctx, warnings)?
            }
            NodeKind::HardBreak => "\n".to_string(),
            NodeKind::InlineCard | NodeKind::BlockCard | NodeKind::EmbedCard => {
                self.handle_card(node, warnings)
            }
            NodeKind::Blockquote => self.handle_blockquote(node, depth, ctx, warnings)?,
            NodeKind::BulletList => self.handle_list(node, false, depth, ctx, warnings)?,
            NodeKind::OrderedList => self.handle_list(node, true, depth, ctx, warnings)?,
            NodeKind::ListItem => {
                // An item outside any list renders as a bullet
                self.handle_list_item(node, ListContext::Bullet, depth, ctx, warnings)?
            }
            NodeKind::CodeBlock => self.handle_code_block(node),
            NodeKind::Rule => "\n\n---\n".to_string(),
            NodeKind::Emoji => node
                .attr_str("shortName")
                .or_else(|| node.attr_str("text"))
                .unwrap_or_default()
                .to_string(),
            NodeKind::Table => self.join_children(node, "", depth, ctx, warnings)?,
            NodeKind::TableRow => self.handle_table_row(node, depth, ctx, warnings)?,
            NodeKind::TableHeader | NodeKind::TableCell => {
                let cell = self.join_children(node, "", depth, ctx, warnings)?;
                format!("{}|", escape_cell(&cell))
            }
            NodeKind::Media => format!("![]({})", node.attr_str("alt").unwrap_or_default()),
            NodeKind::Mention => {
                let text = node.attr_str("text").unwrap_or_default();
                if text.starts_with('@') {
                    text.to_string()
                } else {
                    format!("@{text}")
                }
            }
            NodeKind::Status => format!("`{}`", node.attr_str("text").unwrap_or_default()),
            NodeKind::TaskItem => {
                let checkbox = if node.attr_str("state") == Some("DONE") {
                    "- [x]"
                } else {
                    "- [ ]"
                };
                let text = self.join_children(node, "", depth, ctx, warnings)?;
                format!("{checkbox} {text}")
            }
            NodeKind::Unknown(tag) => {
                tracing::warn!(kind = %tag, "unsupported document node, skipping");
                warnings.record(ConversionWarning::UnknownNode(tag.clone()));
                String::new()
            }
        };

        Ok(fragment)
    }

    /// Convert all children and join the fragments with `separator`
    fn join_children(
        &self,
        node: &DocNode,
        separator: &str,
        depth: usize,
        ctx: &mut ConversionContext,
        warnings: &mut Warnings,
    ) -> Result<String, ConversionError> {
        Ok(self
            .convert_children(node, depth, ctx, warnings)?
            .join(separator))
    }

    fn convert_children(
        &self,
        node: &DocNode,
        depth: usize,
        ctx: &mut ConversionContext,
        warnings: &mut Warnings,
    ) -> Result<Vec<String>, ConversionError> {
        node.content
            .iter()
            .map(|child| self.convert_node(child, depth + 1, ctx, warnings))
            .collect()
    }

    /// Handle panel nodes
    ///
    /// The panel type becomes a leading emoji spliced onto the first rendered
    /// child: warning ⚠️, success ✅, info ℹ️, note 🗒, error ❌. Other types
    /// get no emoji.
    fn handle_panel(
        &self,
        node: &DocNode,
        depth: usize,
        ctx: &mut ConversionContext,
        warnings: &mut Warnings,
    ) -> Result<String, ConversionError> {
        let emoji = match node.attr_str("panelType") {
            Some("warning") => "⚠️",
            Some("success") => "✅",
            Some("info") => "ℹ️",
            Some("note") => "🗒",
            Some("error") => "❌",
            _ => "",
        };

        let mut parts = self.convert_children(node, depth, ctx, warnings)?;
        if let Some(first) = parts.first_mut()
            && !emoji.is_empty()
        {
            *first = format!("{emoji} {first}");
        }

        Ok(parts.join("\n\n"))
    }

    /// Handle expand (collapsible) nodes: the title becomes a level-4 heading
    fn handle_expand(
        &self,
        node: &DocNode,
        depth: usize,
        ctx: &mut ConversionContext,
        warnings: &mut Warnings,
    ) -> Result<String, ConversionError> {
        let body = self.join_children(node, "\n\n", depth, ctx, warnings)?;
        match node.attr_str("title").map(str::trim) {
            Some(title) if !title.is_empty() => Ok(format!("#### {title}\n\n{body}")),
            _ => Ok(body),
        }
    }

    /// Handle link cards: label and target are both the raw URL
    fn handle_card(&self, node: &DocNode, warnings: &mut Warnings) -> String {
        let url = node.attr_str("url").unwrap_or_default();
        if url.is_empty() {
            return String::new();
        }
        if self.options.sanitize_urls && self.security_validator.is_dangerous_url(url) {
            warnings.record(ConversionWarning::UnsafeUrl(url.to_string()));
            return String::new();
        }
        format!("[{url}]({url})")
    }

    /// Handle blockquotes: every line of the quoted blocks is prefixed
    fn handle_blockquote(
        &self,
        node: &DocNode,
        depth: usize,
        ctx: &mut ConversionContext,
        warnings: &mut Warnings,
    ) -> Result<String, ConversionError> {
        let inner = self.join_children(node, "\n\n", depth, ctx, warnings)?;
        let quoted = inner
            .lines()
            .map(|line| {
                if line.is_empty() {
                    ">".to_string()
                } else {
                    format!("> {line}")
                }
            })
            .collect::<Vec<_>>()
            .join("\n");
        Ok(quoted)
    }

    /// Handle bullet and ordered lists
    ///
    /// The ordered counter is a local accumulator: it starts at the list's
    /// `order` attribute (1 when absent) and advances once per item.
    fn handle_list(
        &self,
        node: &DocNode,
        ordered: bool,
        depth: usize,
        ctx: &mut ConversionContext,
        warnings: &mut Warnings,
    ) -> Result<String, ConversionError> {
        let mut counter = node.attr_u64("order").unwrap_or(1);
        let mut items = Vec::with_capacity(node.content.len());

        for child in &node.content {
            if child.kind != NodeKind::ListItem {
                items.push(self.convert_node(child, depth + 1, ctx, warnings)?);
                continue;
            }

            let list = if ordered {
                ListContext::Ordered(counter)
            } else {
                ListContext::Bullet
            };
            items.push(self.handle_list_item(child, list, depth + 1, ctx, warnings)?);

            if ordered {
                counter += 1;
            }
        }

        Ok(items.join("\n"))
    }

    /// Handle one list item
    ///
    /// Inline content is joined on the marker line. Nested lists follow on
    /// their own lines, indented to the item's content column so they stay
    /// nested in CommonMark.
    fn handle_list_item(
        &self,
        node: &DocNode,
        list: ListContext,
        depth: usize,
        ctx: &mut ConversionContext,
        warnings: &mut Warnings,
    ) -> Result<String, ConversionError> {
        self.enter(depth, ctx)?;

        let marker = list.marker();
        let mut inline_parts = Vec::new();
        let mut nested_lists = Vec::new();

        for child in &node.content {
            let converted = self.convert_node(child, depth + 1, ctx, warnings)?;
            match child.kind {
                NodeKind::BulletList | NodeKind::OrderedList => nested_lists.push(converted),
                _ => inline_parts.push(converted.trim_end().to_string()),
            }
        }

        let mut output = format!("  {} {}", marker, inline_parts.join(" "));

        let indent = " ".repeat(marker.len() + 1);
        for nested in nested_lists {
            for line in nested.lines() {
                output.push('\n');
                if !line.is_empty() {
                    output.push_str(&indent);
                }
                output.push_str(line);
            }
        }

        Ok(output)
    }

    /// Handle code blocks
    ///
    /// The body is the raw text of the children, never escaped or marked up.
    fn handle_code_block(&self, node: &DocNode) -> String {
        let language = node.attr_str("language").unwrap_or_default();
        let body = node
            .content
            .iter()
            .map(DocNode::plain_text)
            .collect::<Vec<_>>()
            .join("\n");
        format!("\n```{language}\n{body}\n```")
    }

    /// Handle table rows
    ///
    /// A row with N header cells is followed by N `|:---` separator cells.
    fn handle_table_row(
        &self,
        node: &DocNode,
        depth: usize,
        ctx: &mut ConversionContext,
        warnings: &mut Warnings,
    ) -> Result<String, ConversionError> {
        let mut output = String::from("|");
        let mut header_count = 0;

        for cell in &node.content {
            if cell.kind == NodeKind::TableHeader {
                header_count += 1;
            }
            output.push_str(&self.convert_node(cell, depth + 1, ctx, warnings)?);
        }

        output.push('\n');
        if header_count > 0 {
            output.push_str(&SEPARATOR_CELL.repeat(header_count));
            output.push_str("|\n");
        }

        Ok(output)
    }
}

impl Default for MarkdownConverter {
    fn default() -> Self {
        Self::new()
    }
}

/// Keep a cell on one table line
fn escape_cell(cell: &str) -> String {
    cell.trim().replace('|', "\\|").replace('\n', " ")
}

/// Normalize Markdown output for deterministic results
///
/// 1. CRLF line endings become LF
/// 2. Trailing whitespace is removed from every line
/// 3. Runs of blank lines collapse to one (kept verbatim inside code fences)
/// 4. Leading blank lines are dropped
/// 5. Non-empty output ends with exactly one newline
fn normalize_output(output: &str) -> String {
    let output = output.replace("\r\n", "\n");

    let mut result = String::with_capacity(output.len());
    let mut prev_blank = true;
    let mut in_code_block = false;

    for line in output.lines() {
        let trimmed = line.trim_end();

        if trimmed.trim_start().starts_with("```") {
            in_code_block = !in_code_block;
            result.push_str(trimmed);
            result.push('\n');
            prev_blank = false;
            continue;
        }

        if trimmed.is_empty() {
            if in_code_block || !prev_blank {
                result.push('\n');
                prev_blank = true;
            }
        } else {
            result.push_str(trimmed);
            result.push('\n');
            prev_blank = false;
        }
    }

    while result.ends_with("\n\n") {
        result.pop();
    }

    result
}
