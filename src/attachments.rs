//! Attachment reference rewriting
//!
//! Converted descriptions refer to attachments through placeholders: the
//! converter and the wiki markup pass emit `![](<file name>)`, Xray steps
//! embed `!xray-attachment://<id>|...!` and TestRail text links to
//! `index.php?/attachments/get/<id>` (legacy) or `/api/v2/get_attachment/<id>`.
//! Once a file has been uploaded, every placeholder for it is replaced by the
//! uploaded URL.
//!
//! All placeholder shapes are built in [`AttachmentRef::placeholders`]; the
//! sweep patterns in [`pending_references`] recognize exactly the same shapes.
//!
//! Replacement is literal substring replacement: URLs are never interpreted
//! as patterns. Rewriting already-rewritten text is a no-op because the
//! placeholders no longer occur in it.
//!
//! ```
//! use testcase_migrator::attachments::{rewrite, AttachmentRef, Substitution};
//!
//! let subs = [Substitution::new(
//!     AttachmentRef::FileName("login.png".into()),
//!     "https://cdn.example/a1",
//!     "login.png",
//!     false,
//! )];
//! let once = rewrite("See ![](login.png)", &subs);
//! assert_eq!(once, "See ![](https://cdn.example/a1)");
//! assert_eq!(rewrite(&once, &subs), once);
//! ```

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::Regex;

/// File extensions embedded as images whatever the declared content type
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

/// A reference to one attachment inside description text
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttachmentRef {
    /// Jira issue attachment, referenced by file name
    FileName(String),
    /// Xray step attachment, referenced by id
    XrayId(String),
    /// TestRail attachment, referenced by id
    TestRailId(String),
}

impl AttachmentRef {
    /// Every textual form this reference can take
    pub fn placeholders(&self) -> Vec<String> {
        match self {
            AttachmentRef::FileName(name) => vec![format!("![]({name})")],
            AttachmentRef::XrayId(id) => vec![
                format!("![](xray-attachment://{id})"),
                format!("!xray-attachment://{id}|"),
            ],
            AttachmentRef::TestRailId(id) => vec![
                format!("![](index.php?/attachments/get/{id})"),
                format!("![](/api/v2/get_attachment/{id})"),
            ],
        }
    }

    /// Source identifier (file name or attachment id)
    pub fn key(&self) -> &str {
        match self {
            AttachmentRef::FileName(key)
            | AttachmentRef::XrayId(key)
            | AttachmentRef::TestRailId(key) => key,
        }
    }
}

/// Final URL for one attachment reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    pub reference: AttachmentRef,
    pub url: String,
    pub file_name: String,
    pub is_image: bool,
}

impl Substitution {
    /// Create a substitution; image file extensions force the image form
    pub fn new(
        reference: AttachmentRef,
        url: impl Into<String>,
        file_name: impl Into<String>,
        declared_image: bool,
    ) -> Self {
        let file_name = file_name.into();
        let is_image = declared_image || is_image_file(&file_name);
        Self {
            reference,
            url: url.into(),
            file_name,
            is_image,
        }
    }

    /// Markdown that replaces the placeholders
    pub fn replacement(&self) -> String {
        if self.is_image {
            format!("![]({})", self.url)
        } else {
            format!("[{}]({})", self.file_name, self.url)
        }
    }
}

/// Whether a file name has an image extension
pub fn is_image_file(name: &str) -> bool {
    name.rsplit_once('.')
        .map(|(_, extension)| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|image| extension.eq_ignore_ascii_case(image))
        })
        .unwrap_or(false)
}

/// Replace every placeholder of every substitution
pub fn rewrite(text: &str, substitutions: &[Substitution]) -> String {
    let mut output = text.to_string();
    for substitution in substitutions {
        let replacement = substitution.replacement();
        for placeholder in substitution.reference.placeholders() {
            if output.contains(&placeholder) {
                output = output.replace(&placeholder, &replacement);
            }
        }
    }
    output
}

struct Patterns {
    xray_embed: Regex,
    xray_any: Regex,
    testrail: Regex,
}

fn patterns() -> Option<&'static Patterns> {
    static PATTERNS: OnceLock<Option<Patterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(Patterns {
                xray_embed: Regex::new(r"!xray-attachment://([\w-]+)(?:\|[^!\n]*)?!").ok()?,
                xray_any: Regex::new(r"xray-attachment://([\w-]+)").ok()?,
                testrail: Regex::new(
                    r"!\[\]\((?:index\.php\?/attachments/get/|/api/v2/get_attachment/)([\w-]+)\)",
                )
                .ok()?,
            })
        })
        .as_ref()
}

/// Bring Xray's inline attachment syntax to the `![](...)` placeholder form
///
/// `!xray-attachment://42|width=300!` becomes `![](xray-attachment://42)`, so
/// the display options do not survive as stray text after rewriting.
pub fn canonicalize(text: &str) -> Cow<'_, str> {
    match patterns() {
        Some(patterns) => patterns
            .xray_embed
            .replace_all(text, "![](xray-attachment://$1)"),
        None => Cow::Borrowed(text),
    }
}

/// ID-based references still present in `text`, in order of appearance
///
/// File-name references are not swept: they are only known from the
/// issue's attachment list.
pub fn pending_references(text: &str) -> Vec<AttachmentRef> {
    let Some(patterns) = patterns() else {
        return Vec::new();
    };

    let mut found: Vec<(usize, AttachmentRef)> = patterns
        .xray_any
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some((whole.start(), AttachmentRef::XrayId(caps[1].to_string())))
        })
        .chain(patterns.testrail.captures_iter(text).filter_map(|caps| {
            let whole = caps.get(0)?;
            Some((whole.start(), AttachmentRef::TestRailId(caps[1].to_string())))
        }))
        .collect();
    found.sort_by_key(|(position, _)| *position);

    let mut references: Vec<AttachmentRef> = Vec::with_capacity(found.len());
    for (_, reference) in found {
        if !references.contains(&reference) {
            references.push(reference);
        }
    }
    references
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_image_and_link_forms() {
        let subs = [
            Substitution::new(
                AttachmentRef::FileName("shot.jpg".into()),
                "https://u/1",
                "shot.jpg",
                false,
            ),
            Substitution::new(
                AttachmentRef::FileName("log.txt".into()),
                "https://u/2",
                "log.txt",
                false,
            ),
        ];
        let text = "A ![](shot.jpg) B ![](log.txt) C ![](shot.jpg)";
        assert_eq!(
            rewrite(text, &subs),
            "A ![](https://u/1) B [log.txt](https://u/2) C ![](https://u/1)"
        );
    }

    #[test]
    fn test_declared_image_without_extension() {
        let sub = Substitution::new(
            AttachmentRef::TestRailId("7".into()),
            "https://u/7",
            "paste",
            true,
        );
        assert_eq!(sub.replacement(), "![](https://u/7)");
    }

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file("a.png"));
        assert!(is_image_file("A.JPG"));
        assert!(is_image_file("diagram.webp"));
        assert!(!is_image_file("report.pdf"));
        assert!(!is_image_file("png"));
    }

    #[test]
    fn test_url_is_not_a_pattern() {
        let subs = [Substitution::new(
            AttachmentRef::FileName("x.txt".into()),
            "https://u/$1?a=(b)",
            "x.txt",
            false,
        )];
        assert_eq!(rewrite("![](x.txt)", &subs), "[x.txt](https://u/$1?a=(b))");
    }

    #[test]
    fn test_testrail_legacy_and_current_forms() {
        let subs = [Substitution::new(
            AttachmentRef::TestRailId("15".into()),
            "https://u/15",
            "screen.png",
            false,
        )];
        let text = "![](index.php?/attachments/get/15) and ![](/api/v2/get_attachment/15)";
        assert_eq!(rewrite(text, &subs), "![](https://u/15) and ![](https://u/15)");
    }

    #[test]
    fn test_xray_canonicalize_then_rewrite() {
        let text = canonicalize("Click !xray-attachment://a1b2|width=300,height=200! now");
        assert_eq!(text, "Click ![](xray-attachment://a1b2) now");

        let subs = [Substitution::new(
            AttachmentRef::XrayId("a1b2".into()),
            "https://u/x",
            "btn.gif",
            false,
        )];
        assert_eq!(rewrite(&text, &subs), "Click ![](https://u/x) now");
    }

    #[test]
    fn test_pending_references_in_order_without_duplicates() {
        let text = "![](/api/v2/get_attachment/9) !xray-attachment://x1|w=1! \
                    ![](index.php?/attachments/get/3) ![](/api/v2/get_attachment/9)";
        assert_eq!(
            pending_references(text),
            vec![
                AttachmentRef::TestRailId("9".into()),
                AttachmentRef::XrayId("x1".into()),
                AttachmentRef::TestRailId("3".into()),
            ]
        );
        assert!(pending_references("![](https://u/9)").is_empty());
    }

    proptest! {
        /// A second rewrite pass changes nothing
        #[test]
        fn prop_rewrite_is_idempotent(
            names in prop::collection::vec("[a-z]{1,8}\\.(png|txt|pdf)", 1..5),
            prefix in "[a-zA-Z ]{0,20}",
        ) {
            let subs: Vec<Substitution> = names
                .iter()
                .enumerate()
                .map(|(i, name)| Substitution::new(
                    AttachmentRef::FileName(name.clone()),
                    format!("https://cdn.example/{i}"),
                    name.clone(),
                    false,
                ))
                .collect();
            let text: String = names
                .iter()
                .map(|name| format!("{prefix} ![]({name})"))
                .collect::<Vec<_>>()
                .join("\n");

            let once = rewrite(&text, &subs);
            prop_assert_eq!(rewrite(&once, &subs), once.clone());
            prop_assert!(pending_references(&once).is_empty());
        }
    }
}
