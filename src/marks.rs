//! Mark composition for text leaves
//!
//! A text node carries an ordered list of marks. They are folded left to
//! right over the text, each step wrapping the accumulator, so the first mark
//! in the list ends up innermost and the last one outermost:
//!
//! ```rust
//! use testcase_migrator::document::{Mark, MarkKind};
//! use testcase_migrator::marks::apply_marks;
//! use testcase_migrator::converter::Warnings;
//!
//! let mut warnings = Warnings::default();
//! let em_then_strong = [Mark::new(MarkKind::Em), Mark::new(MarkKind::Strong)];
//! assert_eq!(apply_marks("x", &em_then_strong, &mut warnings), "**_x_**");
//!
//! let strong_then_em = [Mark::new(MarkKind::Strong), Mark::new(MarkKind::Em)];
//! assert_eq!(apply_marks("x", &strong_then_em, &mut warnings), "_**x**_");
//! ```
//!
//! Callers must therefore pass marks in source order, untouched.

use crate::converter::{ConversionWarning, Warnings};
use crate::document::{Mark, MarkKind};
use crate::security::SecurityValidator;

/// Apply marks to `text`, recording unsupported marks in `warnings`
pub fn apply_marks(text: &str, marks: &[Mark], warnings: &mut Warnings) -> String {
    apply_marks_with_validator(text, marks, warnings, None)
}

/// Apply marks, dropping link marks whose target `validator` rejects
///
/// A rejected link leaves the text unwrapped for that mark and records a
/// [`ConversionWarning::UnsafeUrl`].
pub fn apply_marks_with_validator(
    text: &str,
    marks: &[Mark],
    warnings: &mut Warnings,
    validator: Option<&SecurityValidator>,
) -> String {
    marks
        .iter()
        .fold(text.to_string(), |converted, mark| match &mark.kind {
            MarkKind::Code => format!("`{converted}`"),
            MarkKind::Em => format!("_{converted}_"),
            MarkKind::Strike => format!("~{converted}~"),
            MarkKind::Strong => format!("**{converted}**"),
            MarkKind::Link => {
                let href = mark.href().unwrap_or_default();
                match validator {
                    Some(v) if v.is_dangerous_url(href) => {
                        warnings.record(ConversionWarning::UnsafeUrl(href.to_string()));
                        converted
                    }
                    _ => format!("[{converted}]({href})"),
                }
            }
            MarkKind::Unsupported(tag) => {
                warnings.record(ConversionWarning::UnsupportedMark(tag.clone()));
                converted
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn marks(kinds: &[MarkKind]) -> Vec<Mark> {
        kinds.iter().cloned().map(Mark::new).collect()
    }

    #[test]
    fn test_no_marks_passes_text_through() {
        let mut warnings = Warnings::default();
        assert_eq!(apply_marks("plain", &[], &mut warnings), "plain");
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_each_mark_wraps() {
        let mut warnings = Warnings::default();
        assert_eq!(apply_marks("x", &marks(&[MarkKind::Code]), &mut warnings), "`x`");
        assert_eq!(apply_marks("x", &marks(&[MarkKind::Em]), &mut warnings), "_x_");
        assert_eq!(apply_marks("x", &marks(&[MarkKind::Strike]), &mut warnings), "~x~");
        assert_eq!(apply_marks("x", &marks(&[MarkKind::Strong]), &mut warnings), "**x**");
        assert_eq!(
            apply_marks("docs", &[Mark::link("https://d.io")], &mut warnings),
            "[docs](https://d.io)"
        );
    }

    #[test]
    fn test_link_then_strong() {
        let mut warnings = Warnings::default();
        let marks = vec![Mark::link("https://d.io"), Mark::new(MarkKind::Strong)];
        assert_eq!(apply_marks("docs", &marks, &mut warnings), "**[docs](https://d.io)**");
    }

    #[test]
    fn test_unsupported_mark_is_recorded_and_skipped() {
        let mut warnings = Warnings::default();
        let marks = marks(&[
            MarkKind::Unsupported("underline".to_string()),
            MarkKind::Strong,
        ]);
        assert_eq!(apply_marks("x", &marks, &mut warnings), "**x**");
        assert!(
            warnings
                .iter()
                .any(|w| *w == ConversionWarning::UnsupportedMark("underline".to_string()))
        );
    }

    #[test]
    fn test_dangerous_link_left_unwrapped() {
        let mut warnings = Warnings::default();
        let validator = SecurityValidator::new();
        let marks = vec![Mark::link("javascript:alert(1)"), Mark::new(MarkKind::Em)];
        let out = apply_marks_with_validator("click", &marks, &mut warnings, Some(&validator));
        assert_eq!(out, "_click_");
        assert_eq!(warnings.len(), 1);
    }

    fn strong_em() -> impl Strategy<Value = MarkKind> {
        prop_oneof![Just(MarkKind::Strong), Just(MarkKind::Em)]
    }

    proptest! {
        /// Delimiters nest in exactly the order the marks were listed
        #[test]
        fn prop_nesting_follows_mark_order(
            text in "[a-z]{1,12}",
            kinds in prop::collection::vec(strong_em(), 0..6),
        ) {
            let mut warnings = Warnings::default();
            let out = apply_marks(&text, &marks(&kinds), &mut warnings);

            let mut expected = text.clone();
            for kind in &kinds {
                expected = match kind {
                    MarkKind::Strong => format!("**{expected}**"),
                    _ => format!("_{expected}_"),
                };
            }
            prop_assert_eq!(out, expected);
            prop_assert!(warnings.is_empty());
        }
    }
}
