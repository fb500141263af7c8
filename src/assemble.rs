//! Final test description assembly
//!
//! The destination stores one Markdown description per test. It is built from
//! the converted source description, a preconditions block above it and a
//! steps section below it:
//!
//! ```text
//! ## Preconditions
//!
//! #### Logged in
//!
//! A user session exists
//!
//! <description>
//!
//! ## Steps
//!
//! * Open the cart
//! *Expected*: Cart is empty
//! ```

use crate::attachments::canonicalize;
use crate::source::{Precondition, Step};

/// Marker for a step that reuses a test which was never migrated
pub const MISSING_CALLED_TEST: &str = "* !!![steps from a missing XRay test]]]!!!";

/// `## Preconditions` block, `None` without preconditions
pub fn preconditions_block(preconditions: &[Precondition]) -> Option<String> {
    if preconditions.is_empty() {
        return None;
    }

    let entries: Vec<String> = preconditions
        .iter()
        .map(|precondition| match &precondition.title {
            Some(title) => format!("#### {title}\n\n{}", precondition.description),
            None => precondition.description.clone(),
        })
        .collect();

    Some(format!("## Preconditions\n\n{}", entries.join("\n\n")))
}

/// Render one step
///
/// `resolve_called` maps a called source test id to its destination id.
pub fn render_step(step: &Step, resolve_called: &impl Fn(&str) -> Option<String>) -> String {
    if step.action.trim().is_empty()
        && let Some(called) = &step.called_test_id
    {
        return match resolve_called(called) {
            Some(destination_id) => format!("* Steps from @T{destination_id}"),
            None => MISSING_CALLED_TEST.to_string(),
        };
    }

    let mut lines = vec![format!("* {}", canonicalize(&step.action))];
    if let Some(data) = step.data.as_deref().filter(|data| !data.is_empty()) {
        let data = data.replace("{noformat}", "").replace("\\{", "{");
        lines.push(format!("```\n{}\n```", canonicalize(&data)));
    }
    if let Some(result) = step.result.as_deref().filter(|result| !result.is_empty()) {
        lines.push(format!("*Expected*: {}", canonicalize(result)));
    }
    lines.join("\n")
}

/// `## Steps` section, `None` without steps
pub fn steps_section(steps: &[Step], resolve_called: &impl Fn(&str) -> Option<String>) -> Option<String> {
    if steps.is_empty() {
        return None;
    }

    let rendered: Vec<String> = steps
        .iter()
        .map(|step| render_step(step, resolve_called))
        .collect();
    Some(format!("## Steps\n\n{}", rendered.join("\n\n")))
}

/// Full description: preconditions, converted description, steps
///
/// Xray inline attachment tokens anywhere in the result are canonicalized.
pub fn assemble_description(
    description: Option<&str>,
    preconditions: &[Precondition],
    steps: &[Step],
    resolve_called: &impl Fn(&str) -> Option<String>,
) -> String {
    let parts: Vec<String> = [
        preconditions_block(preconditions),
        description
            .map(|text| text.trim_end().to_string())
            .filter(|text| !text.is_empty()),
        steps_section(steps, resolve_called),
    ]
    .into_iter()
    .flatten()
    .collect();

    canonicalize(&parts.join("\n\n")).into_owned()
}
