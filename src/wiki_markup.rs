//! Legacy wiki markup to Markdown
//!
//! Older Jira records (and every record fetched through the v2 API) store
//! rich text as wiki markup instead of a structured document. This is a
//! line-oriented text-to-text pass; it does not build a tree.
//!
//! | Wiki markup            | Markdown            |
//! |------------------------|---------------------|
//! | `h2. Title`            | `## Title`          |
//! | `*bold*`               | `**bold**`          |
//! | `_italic_`             | `_italic_`          |
//! | `-strike-`             | `~~strike~~`        |
//! | `{{mono}}`             | `` `mono` ``        |
//! | `[label\|url]`         | `[label](url)`      |
//! | `[url]`                | `<url>`             |
//! | `!file.png\|thumb!`    | `![](file.png)`     |
//! | `** nested`            | `  * nested`        |
//! | `\|\|A\|\|B\|\|`       | `\|A\|B\|` + separator |
//! | `bq. text`, `{quote}`  | `> text`            |
//! | `{code:lang}`          | fenced block        |
//!
//! Image references keep the bare file name so the attachment rewriter can
//! substitute the uploaded URL later. Content inside `{code}` and
//! `{noformat}` blocks, and inside `{{mono}}` spans, is copied untouched.

use regex::Regex;
use std::sync::OnceLock;

struct Rules {
    code_open: Regex,
    rule: Regex,
    heading: Regex,
    quote_line: Regex,
    list_item: Regex,
    mono: Regex,
    color: Regex,
    panel: Regex,
    image: Regex,
    mention: Regex,
    bare_link: Regex,
    labelled_link: Regex,
    bold: Regex,
    strike: Regex,
}

impl Rules {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            code_open: Regex::new(r"^\s*\{(code|noformat)(?:[:|]([^}]*))?\}")?,
            rule: Regex::new(r"^\s*-{4,}\s*$")?,
            heading: Regex::new(r"^\s*h([1-6])\.\s+(.*)$")?,
            quote_line: Regex::new(r"^\s*bq\.\s+(.*)$")?,
            list_item: Regex::new(r"^\s*([*#]+|-)\s+(.*)$")?,
            mono: Regex::new(r"\{\{(.+?)\}\}")?,
            color: Regex::new(r"\{color(?::[^}]*)?\}")?,
            panel: Regex::new(r"\{panel(?::[^}]*)?\}")?,
            image: Regex::new(r"!([^\s!|][^!\n|]*?\.[A-Za-z0-9]{2,5})(?:\|[^!\n]*)?!")?,
            mention: Regex::new(r"\[~(?:accountid:)?([^\]\n]+)\]")?,
            bare_link: Regex::new(r"\[((?:https?|ftp|mailto):[^\[\]\s|]*)\]")?,
            labelled_link: Regex::new(r"\[([^\[\]|\n]+)\|([^\[\]\s]+)\]")?,
            bold: Regex::new(r"(^|[\s(\[{>|])\*([^\s*](?:[^*\n]*[^\s*])?)\*")?,
            strike: Regex::new(r"(^|[\s(>|])-([^\s-](?:[^-\n]*[^\s-])?)-")?,
        })
    }

    /// Convert one line outside code blocks
    fn convert_line(&self, line: &str) -> String {
        let line = line.trim_end();

        if self.rule.is_match(line) {
            return "---".to_string();
        }

        if let Some(caps) = self.heading.captures(line) {
            let level = caps[1].parse::<usize>().unwrap_or(1);
            return format!("{} {}", "#".repeat(level), self.convert_inline(&caps[2]));
        }

        if let Some(caps) = self.quote_line.captures(line) {
            return format!("> {}", self.convert_inline(&caps[1]));
        }

        if let Some(caps) = self.list_item.captures(line) {
            let markers = &caps[1];
            let mut chars: Vec<char> = markers.chars().collect();
            let last = chars.pop().unwrap_or('*');
            // Nested items are indented to the content column of each ancestor
            let indent: String = chars
                .iter()
                .map(|marker| if *marker == '#' { "   " } else { "  " })
                .collect();
            let symbol = if last == '#' { "1." } else { "*" };
            return format!("{indent}{symbol} {}", self.convert_inline(&caps[2]));
        }

        if let Some(header) = line.trim_start().strip_prefix("||") {
            let cells: Vec<String> = header
                .trim_end_matches('|')
                .split("||")
                .map(|cell| self.convert_inline(cell.trim()))
                .collect();
            return format!("|{}|\n|{}", cells.join("|"), ":---|".repeat(cells.len()));
        }

        self.convert_inline(line)
    }

    /// Convert inline markup, leaving `{{mono}}` spans untouched
    fn convert_inline(&self, text: &str) -> String {
        let mut output = String::with_capacity(text.len());
        let mut last = 0;

        for caps in self.mono.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            output.push_str(&self.convert_segment(&text[last..whole.start()]));
            output.push('`');
            output.push_str(&caps[1]);
            output.push('`');
            last = whole.end();
        }

        output.push_str(&self.convert_segment(&text[last..]));
        output
    }

    fn convert_segment(&self, text: &str) -> String {
        let text = self.color.replace_all(text, "");
        let text = self.panel.replace_all(&text, "");
        let text = self.image.replace_all(&text, "![]($1)");
        let text = self.mention.replace_all(&text, "@$1");
        // Bare links first: a converted `[label](url)` must not be rematched
        let text = self.bare_link.replace_all(&text, "<$1>");
        let text = self.labelled_link.replace_all(&text, "[$1]($2)");
        let text = self.bold.replace_all(&text, "$1**$2**");
        let text = self.strike.replace_all(&text, "$1~~$2~~");
        text.into_owned()
    }
}

fn rules() -> Option<&'static Rules> {
    static RULES: OnceLock<Option<Rules>> = OnceLock::new();
    RULES.get_or_init(|| Rules::compile().ok()).as_ref()
}

/// Convert wiki markup text to Markdown
///
/// # Examples
///
/// ```
/// use testcase_migrator::wiki_markup::wiki_to_markdown;
///
/// assert_eq!(wiki_to_markdown("h2. Setup"), "## Setup");
/// assert_eq!(
///     wiki_to_markdown("Open *Settings* and see !ui.png|thumbnail!"),
///     "Open **Settings** and see ![](ui.png)"
/// );
/// ```
pub fn wiki_to_markdown(input: &str) -> String {
    let Some(rules) = rules() else {
        tracing::warn!("wiki markup rules unavailable, keeping text as is");
        return input.to_string();
    };

    let input = input.replace("\r\n", "\n");
    let mut output: Vec<String> = Vec::new();
    let mut fence: Option<&'static str> = None;
    let mut quoted = false;

    for raw_line in input.lines() {
        if let Some(close) = fence {
            match raw_line.find(close) {
                Some(pos) => {
                    let before = &raw_line[..pos];
                    if !before.trim().is_empty() {
                        output.push(before.to_string());
                    }
                    output.push("```".to_string());
                    fence = None;
                    let after = raw_line[pos + close.len()..].trim();
                    if !after.is_empty() {
                        output.push(rules.convert_line(after));
                    }
                }
                None => output.push(raw_line.to_string()),
            }
            continue;
        }

        if let Some(caps) = rules.code_open.captures(raw_line) {
            let close = if &caps[1] == "code" {
                "{code}"
            } else {
                "{noformat}"
            };
            let language = caps
                .get(2)
                .map(|params| params.as_str().split('|').next().unwrap_or_default())
                .filter(|first| !first.contains('='))
                .unwrap_or_default()
                .trim();
            output.push(format!("```{language}"));

            let rest = caps
                .get(0)
                .map(|whole| &raw_line[whole.end()..])
                .unwrap_or_default();
            match rest.find(close) {
                Some(pos) => {
                    if !rest[..pos].trim().is_empty() {
                        output.push(rest[..pos].to_string());
                    }
                    output.push("```".to_string());
                }
                None => {
                    if !rest.trim().is_empty() {
                        output.push(rest.to_string());
                    }
                    fence = Some(close);
                }
            }
            continue;
        }

        let mut line = raw_line;
        if let Some(rest) = line.trim_start().strip_prefix("{quote}") {
            quoted = !quoted;
            line = rest;
            if line.trim().is_empty() {
                continue;
            }
        }
        let mut closes_quote = false;
        if let Some(rest) = line.trim_end().strip_suffix("{quote}") {
            line = rest;
            closes_quote = true;
        }

        let converted = rules.convert_line(line);
        if quoted {
            if converted.is_empty() {
                output.push(">".to_string());
            } else {
                output.push(format!("> {converted}"));
            }
        } else {
            output.push(converted);
        }

        if closes_quote {
            quoted = !quoted;
        }
    }

    // Unterminated block
    if fence.is_some() {
        output.push("```".to_string());
    }

    output.join("\n")
}
