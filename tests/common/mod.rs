//! In-memory source and destination shared by the migration tests
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use testcase_migrator::attachments::AttachmentRef;
use testcase_migrator::destination::{
    DestinationWriter, Label, LabelAttributes, SuiteAttributes, TestAttributes,
};
use testcase_migrator::error::MigrationError;
use testcase_migrator::hierarchy::FolderNode;
use testcase_migrator::source::{
    AttachmentMeta, ExternalIssue, ListedTest, RawTestCase, SourceReader, Step,
};

pub fn folder(id: &str, name: &str, parent: Option<&str>, children: &[&str], tests: u64) -> FolderNode {
    FolderNode {
        id: id.to_string(),
        name: name.to_string(),
        parent_id: parent.map(str::to_string),
        child_folder_ids: children.iter().map(|c| c.to_string()).collect(),
        direct_test_count: tests,
    }
}

pub fn case(id: &str, summary: &str) -> RawTestCase {
    RawTestCase {
        id: id.to_string(),
        summary: summary.to_string(),
        issue_type: Some("Test".to_string()),
        ..Default::default()
    }
}

pub fn image(reference: AttachmentRef, file_name: &str) -> AttachmentMeta {
    AttachmentMeta {
        location: reference.key().to_string(),
        reference,
        file_name: file_name.to_string(),
        is_image: true,
    }
}

/// Source backed by maps; attachment bytes are keyed by location
pub struct FakeSource {
    pub folders: Vec<FolderNode>,
    pub listings: HashMap<String, Vec<ListedTest>>,
    pub details: HashMap<String, RawTestCase>,
    pub steps: HashMap<String, Vec<Step>>,
    pub failing_steps: HashSet<String>,
    pub preconditions: HashMap<String, Vec<String>>,
    pub files: HashMap<String, Vec<u8>>,
    pub downloads: Vec<String>,
    scratch: TempDir,
}

impl FakeSource {
    pub fn new(folders: Vec<FolderNode>) -> Self {
        Self {
            folders,
            listings: HashMap::new(),
            details: HashMap::new(),
            steps: HashMap::new(),
            failing_steps: HashSet::new(),
            preconditions: HashMap::new(),
            files: HashMap::new(),
            downloads: Vec::new(),
            scratch: tempfile::tempdir().expect("scratch dir"),
        }
    }

    /// List a fully loaded case in `folder_id`
    pub fn loaded(mut self, folder_id: &str, case: RawTestCase) -> Self {
        self.listings
            .entry(folder_id.to_string())
            .or_default()
            .push(ListedTest::Loaded(Box::new(case)));
        self
    }

    /// List an id in `folder_id`; the detail comes from `details`
    pub fn pending(mut self, folder_id: &str, id: &str) -> Self {
        self.listings
            .entry(folder_id.to_string())
            .or_default()
            .push(ListedTest::Pending(id.to_string()));
        self
    }

    pub fn detail(mut self, case: RawTestCase) -> Self {
        self.details.insert(case.id.clone(), case);
        self
    }

    pub fn file(mut self, location: &str, bytes: &[u8]) -> Self {
        self.files.insert(location.to_string(), bytes.to_vec());
        self
    }
}

impl SourceReader for FakeSource {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn list_folders(&mut self) -> Result<Vec<FolderNode>, MigrationError> {
        Ok(self.folders.clone())
    }

    fn list_test_cases_in_folder(&mut self, folder_id: &str) -> Result<Vec<ListedTest>, MigrationError> {
        Ok(self.listings.get(folder_id).cloned().unwrap_or_default())
    }

    fn fetch_test_detail(&mut self, id: &str) -> Result<Option<RawTestCase>, MigrationError> {
        Ok(self.details.get(id).cloned())
    }

    fn fetch_steps(&mut self, id: &str) -> Result<Vec<Step>, MigrationError> {
        if self.failing_steps.contains(id) {
            return Err(MigrationError::Http {
                status: 500,
                url: format!("fake://steps/{id}"),
                body: "boom".to_string(),
            });
        }
        Ok(self.steps.get(id).cloned().unwrap_or_default())
    }

    fn fetch_precondition_ids(&mut self, id: &str) -> Result<Vec<String>, MigrationError> {
        Ok(self.preconditions.get(id).cloned().unwrap_or_default())
    }

    fn download_attachment(&mut self, attachment: &AttachmentMeta) -> Result<PathBuf, MigrationError> {
        let bytes = self
            .files
            .get(&attachment.location)
            .ok_or_else(|| MigrationError::NotFound(attachment.location.clone()))?;
        self.downloads.push(attachment.location.clone());
        let path = self
            .scratch
            .path()
            .join(format!("{}-{}", self.downloads.len(), attachment.file_name));
        std::fs::write(&path, bytes)?;
        Ok(path)
    }
}

/// Destination that records every write and hands out sequential ids
#[derive(Default)]
pub struct RecordingDestination {
    next_id: usize,
    pub suites: Vec<(String, SuiteAttributes)>,
    pub suite_updates: Vec<(String, SuiteAttributes)>,
    pub tests: Vec<(String, TestAttributes)>,
    pub test_updates: Vec<(String, TestAttributes)>,
    pub uploads: Vec<(String, String)>,
    pub existing_labels: Vec<Label>,
    pub created_labels: Vec<LabelAttributes>,
    pub label_links: Vec<(String, String, Option<String>)>,
    pub issue_links: Vec<(String, ExternalIssue)>,
    /// Suite or test titles the destination refuses
    pub rejected_titles: HashSet<String>,
}

impl RecordingDestination {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&mut self, kind: &str) -> String {
        self.next_id += 1;
        format!("{kind}-{}", self.next_id)
    }

    pub fn suite_titled(&self, title: &str) -> Vec<&(String, SuiteAttributes)> {
        self.suites
            .iter()
            .filter(|(_, attrs)| attrs.title.as_deref() == Some(title))
            .collect()
    }

    pub fn test_titled(&self, title: &str) -> Option<&(String, TestAttributes)> {
        self.tests
            .iter()
            .find(|(_, attrs)| attrs.title.as_deref() == Some(title))
    }

    /// Latest description sent for a test
    pub fn description_of(&self, test_id: &str) -> Option<&str> {
        self.test_updates
            .iter()
            .rev()
            .find(|(id, _)| id == test_id)
            .and_then(|(_, attrs)| attrs.description.as_deref())
    }
}

impl DestinationWriter for RecordingDestination {
    fn create_suite(&mut self, attrs: &SuiteAttributes) -> Result<Option<String>, MigrationError> {
        if attrs
            .title
            .as_ref()
            .is_some_and(|title| self.rejected_titles.contains(title))
        {
            return Ok(None);
        }
        let id = self.next("suite");
        self.suites.push((id.clone(), attrs.clone()));
        Ok(Some(id))
    }

    fn update_suite(&mut self, id: &str, attrs: &SuiteAttributes) -> Result<bool, MigrationError> {
        self.suite_updates.push((id.to_string(), attrs.clone()));
        Ok(true)
    }

    fn create_test(&mut self, attrs: &TestAttributes) -> Result<Option<String>, MigrationError> {
        if attrs
            .title
            .as_ref()
            .is_some_and(|title| self.rejected_titles.contains(title))
        {
            return Ok(None);
        }
        let id = self.next("test");
        self.tests.push((id.clone(), attrs.clone()));
        Ok(Some(id))
    }

    fn update_test(&mut self, id: &str, attrs: &TestAttributes) -> Result<bool, MigrationError> {
        self.test_updates.push((id.to_string(), attrs.clone()));
        Ok(true)
    }

    fn upload_attachment(
        &mut self,
        test_id: &str,
        path: &Path,
        name: &str,
    ) -> Result<Option<String>, MigrationError> {
        assert!(path.exists(), "uploaded file should exist");
        self.uploads.push((test_id.to_string(), name.to_string()));
        Ok(Some(format!("https://files.example/{}/{name}", self.uploads.len())))
    }

    fn list_labels(&mut self) -> Result<Vec<Label>, MigrationError> {
        Ok(self.existing_labels.clone())
    }

    fn create_label(&mut self, attrs: &LabelAttributes) -> Result<Option<String>, MigrationError> {
        let id = self.next("label");
        self.created_labels.push(attrs.clone());
        Ok(Some(id))
    }

    fn link_label(
        &mut self,
        label_id: &str,
        test_id: &str,
        value: Option<&str>,
    ) -> Result<bool, MigrationError> {
        self.label_links
            .push((label_id.to_string(), test_id.to_string(), value.map(str::to_string)));
        Ok(true)
    }

    fn link_external_issue(&mut self, test_id: &str, issue: &ExternalIssue) -> Result<bool, MigrationError> {
        self.issue_links.push((test_id.to_string(), issue.clone()));
        Ok(true)
    }
}
