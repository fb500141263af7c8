//! Source readers
//!
//! A source reader turns one source system's REST API into the records the
//! migration consumes: a flat folder list, test cases per folder, steps,
//! precondition links and attachment files. Readers paginate transparently
//! and surface failures as [`MigrationError`] values carrying the HTTP status
//! and body text; deciding which failures skip a test is up to the caller.

pub mod jira;
pub mod testrail;
pub mod xray;

use std::path::PathBuf;

use crate::attachments::AttachmentRef;
use crate::error::MigrationError;
use crate::hierarchy::FolderNode;
use crate::priority::{level_name, map_priority_label};

pub use jira::{JiraClient, JiraSource};
pub use testrail::TestRailSource;
pub use xray::XraySource;

/// Source priority, by label or already rescaled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Priority {
    /// Named priority (Jira)
    Label(String),
    /// Level relative to the source's default priority (TestRail)
    Level(i8),
}

impl Priority {
    /// Destination priority name
    pub fn destination_name(&self) -> &'static str {
        match self {
            Priority::Label(label) => map_priority_label(label),
            Priority::Level(level) => level_name(*level),
        }
    }
}

/// An attachment that can be downloaded from the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentMeta {
    /// How description text refers to this attachment
    pub reference: AttachmentRef,
    pub file_name: String,
    /// Source location, interpreted by the reader that produced it
    pub location: String,
    /// Declared as an image by the source (content type)
    pub is_image: bool,
}

/// Destination label with an optional field value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelValue {
    pub title: String,
    pub value: Option<String>,
}

impl LabelValue {
    pub fn plain(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            value: None,
        }
    }

    pub fn field(title: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            value: Some(value.into()),
        }
    }
}

/// Link from a test to an issue tracker entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalIssue {
    /// Jira issue key, e.g. `PRJ-12`
    JiraKey(String),
    /// Any other tracker, by URL or free-form reference
    Reference(String),
}

/// A precondition rendered above the steps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Precondition {
    pub title: Option<String>,
    pub description: String,
}

/// One test step
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Step {
    pub action: String,
    pub data: Option<String>,
    pub result: Option<String>,
    /// Test whose steps are reused in place of this step
    pub called_test_id: Option<String>,
    pub attachments: Vec<AttachmentMeta>,
}

/// A test case as read from the source, description already in Markdown
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTestCase {
    pub id: String,
    /// Human-facing key (Jira issue key, TestRail `C<id>`)
    pub key: Option<String>,
    pub summary: String,
    /// Issue type for Jira-based sources; only `Test` is migrated
    pub issue_type: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub folder_id: Option<String>,
    pub attachments: Vec<AttachmentMeta>,
    /// Preconditions carried by the case itself (TestRail)
    pub preconditions: Vec<Precondition>,
    pub labels: Vec<LabelValue>,
    pub external_issues: Vec<ExternalIssue>,
}

impl RawTestCase {
    /// Whether a Jira-based source marked this issue as something other than a test
    pub fn is_test(&self) -> bool {
        self.issue_type.as_deref().is_none_or(|kind| kind == "Test")
    }
}

/// An entry of a folder listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListedTest {
    /// Listing already carries the full case
    Loaded(Box<RawTestCase>),
    /// Listing only carries the id; fetch the detail separately
    Pending(String),
}

/// Read side of a migration
pub trait SourceReader {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Flat list of all folders
    fn list_folders(&mut self) -> Result<Vec<FolderNode>, MigrationError>;

    /// Tests directly inside one folder
    fn list_test_cases_in_folder(
        &mut self,
        folder_id: &str,
    ) -> Result<Vec<ListedTest>, MigrationError>;

    /// Full test case, `None` when the source does not know the id
    fn fetch_test_detail(&mut self, id: &str) -> Result<Option<RawTestCase>, MigrationError>;

    /// Ordered steps of a test
    fn fetch_steps(&mut self, id: &str) -> Result<Vec<Step>, MigrationError>;

    /// Ids of the tests or issues serving as preconditions
    fn fetch_precondition_ids(&mut self, id: &str) -> Result<Vec<String>, MigrationError>;

    /// Download an attachment into the run's scratch directory
    fn download_attachment(&mut self, attachment: &AttachmentMeta)
    -> Result<PathBuf, MigrationError>;
}

/// File name that is safe to create inside a scratch directory
pub(crate) fn scratch_file_name(prefix: &str, file_name: &str) -> String {
    let cleaned: String = file_name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    format!("{prefix}-{cleaned}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_destination_name() {
        assert_eq!(Priority::Label("Blocker".into()).destination_name(), "Blocker");
        assert_eq!(Priority::Label("Weird".into()).destination_name(), "normal");
        assert_eq!(Priority::Level(-1).destination_name(), "low");
        assert_eq!(Priority::Level(3).destination_name(), "critical");
    }

    #[test]
    fn test_is_test() {
        let mut case = RawTestCase::default();
        assert!(case.is_test());
        case.issue_type = Some("Test".into());
        assert!(case.is_test());
        case.issue_type = Some("Pre-Condition".into());
        assert!(!case.is_test());
    }

    #[test]
    fn test_scratch_file_name() {
        assert_eq!(scratch_file_name("10", "../../etc/passwd"), "10-_.._etc_passwd");
        assert_eq!(scratch_file_name("a1", "shot.png"), "a1-shot.png");
    }
}
