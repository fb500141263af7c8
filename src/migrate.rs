//! Migration orchestration
//!
//! One run moves a source's folder tree and tests into the destination:
//!
//! 1. list folders (optionally narrowed to one subtree)
//! 2. reconcile the folder tree into suites
//! 3. for each folder, for each test:
//!    create the test, transfer its attachments, rewrite the description,
//!    link its labels and external issues
//!
//! A problem with a single test (unknown id, wrong issue type, unreadable
//! steps, rejected write) skips that test and is recorded as a
//! [`Diagnostic`]. Fatal errors (exhausted write retries, failed listings)
//! abort the run; nothing already written is rolled back.

use std::collections::HashMap;
use std::fmt;

use crate::assemble::assemble_description;
use crate::attachments::{Substitution, pending_references, rewrite};
use crate::destination::{DestinationWriter, LabelAttributes, LabelField, LabelRegistry, TestAttributes};
use crate::error::MigrationError;
use crate::fingerprint::{UploadCache, fingerprint_file};
use crate::hierarchy::{HierarchyReconciler, SuiteIdMapping, select_subtree};
use crate::source::{AttachmentMeta, ListedTest, Precondition, RawTestCase, SourceReader};

/// Why a test was not migrated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The source has no detail for a listed id
    NotFound,
    /// The issue is not of type `Test`
    NotATest(String),
    /// Reading the test detail failed
    DetailFailed(String),
    /// Reading the steps failed
    StepsFailed(String),
    /// No suite could hold the test
    NoSuite,
    /// The destination rejected the test
    NotCreated,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotFound => write!(f, "not found in source"),
            SkipReason::NotATest(kind) => write!(f, "issue type {kind} is not supported"),
            SkipReason::DetailFailed(error) => write!(f, "detail unreadable: {error}"),
            SkipReason::StepsFailed(error) => write!(f, "steps unreadable: {error}"),
            SkipReason::NoSuite => write!(f, "no suite available"),
            SkipReason::NotCreated => write!(f, "rejected by destination"),
        }
    }
}

/// A skipped test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub test_id: String,
    pub title: Option<String>,
    pub reason: SkipReason,
}

/// Counts of created entities
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub suites: usize,
    pub tests: usize,
    pub attachments: usize,
    pub labels: usize,
    pub links: usize,
    pub skipped: Vec<Diagnostic>,
}

impl MigrationReport {
    /// Log the final summary
    pub fn log_summary(&self) {
        tracing::info!(
            suites = self.suites,
            tests = self.tests,
            attachments = self.attachments,
            labels = self.labels,
            links = self.links,
            skipped = self.skipped.len(),
            "migration finished"
        );
        for diagnostic in &self.skipped {
            tracing::info!(
                test = %diagnostic.test_id,
                title = diagnostic.title.as_deref().unwrap_or(""),
                reason = %diagnostic.reason,
                "skipped"
            );
        }
    }
}

/// Runs one migration from `S` into `D`
#[derive(Debug)]
pub struct Migrator<S, D> {
    source: S,
    destination: D,
    folder_id: Option<String>,
    mapping: SuiteIdMapping,
    /// Source test id to destination test id
    migrated: HashMap<String, String>,
    labels: LabelRegistry,
    report: MigrationReport,
}

impl<S: SourceReader, D: DestinationWriter> Migrator<S, D> {
    pub fn new(source: S, destination: D) -> Self {
        Self {
            source,
            destination,
            folder_id: None,
            mapping: SuiteIdMapping::new(),
            migrated: HashMap::new(),
            labels: LabelRegistry::new(),
            report: MigrationReport::default(),
        }
    }

    /// Migrate only this folder and its descendants
    pub fn with_folder(mut self, folder_id: Option<String>) -> Self {
        self.folder_id = folder_id;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn destination(&self) -> &D {
        &self.destination
    }

    /// Destination id of a migrated source test
    pub fn destination_test_id(&self, source_id: &str) -> Option<&str> {
        self.migrated.get(source_id).map(String::as_str)
    }

    /// Run the migration
    ///
    /// # Errors
    ///
    /// Fatal errors only: failed listings, exhausted destination retries,
    /// a missing subset folder.
    pub fn run(&mut self) -> Result<MigrationReport, MigrationError> {
        let mut folders = self.source.list_folders()?;
        if let Some(folder_id) = &self.folder_id {
            tracing::info!(folder = %folder_id, "migrating a single folder");
            folders = select_subtree(&folders, folder_id)?;
        }

        tracing::info!(source = self.source.name(), folders = folders.len(), "creating suites");
        let reconciliation = HierarchyReconciler::reconcile(&folders, &mut self.destination)?;
        self.report.suites = reconciliation.suites_created;
        self.mapping = reconciliation.mapping;

        tracing::info!("creating tests");
        for folder in &folders {
            let listed = self.source.list_test_cases_in_folder(&folder.id)?;
            if !listed.is_empty() {
                tracing::info!(folder = %folder.name, tests = listed.len(), "migrating folder");
            }
            for entry in listed {
                self.migrate_entry(&folder.id, entry)?;
            }
        }

        if self.mapping.root_suite().is_some() {
            self.report.suites += 1;
        }
        Ok(std::mem::take(&mut self.report))
    }

    fn skip(&mut self, test_id: &str, title: Option<&str>, reason: SkipReason) {
        tracing::info!(test = test_id, reason = %reason, "skipping test");
        self.report.skipped.push(Diagnostic {
            test_id: test_id.to_string(),
            title: title.map(str::to_string),
            reason,
        });
    }

    fn migrate_entry(&mut self, folder_id: &str, entry: ListedTest) -> Result<(), MigrationError> {
        let case = match entry {
            ListedTest::Loaded(case) => *case,
            ListedTest::Pending(id) => match self.source.fetch_test_detail(&id) {
                Ok(Some(case)) => case,
                Ok(None) => {
                    self.skip(&id, None, SkipReason::NotFound);
                    return Ok(());
                }
                Err(e) => {
                    self.skip(&id, None, SkipReason::DetailFailed(e.to_string()));
                    return Ok(());
                }
            },
        };

        if self.migrated.contains_key(&case.id) {
            tracing::debug!(test = %case.id, "already migrated");
            return Ok(());
        }
        if !case.is_test() {
            let kind = case.issue_type.clone().unwrap_or_default();
            self.skip(&case.id, Some(&case.summary), SkipReason::NotATest(kind));
            return Ok(());
        }

        let steps = match self.source.fetch_steps(&case.id) {
            Ok(steps) => steps,
            Err(e) => {
                self.skip(&case.id, Some(&case.summary), SkipReason::StepsFailed(e.to_string()));
                return Ok(());
            }
        };
        let preconditions = self.preconditions_of(&case);

        let folder = case.folder_id.as_deref().unwrap_or(folder_id);
        let Some(suite_id) = self.mapping.file_suite_for(Some(folder), &mut self.destination)? else {
            self.skip(&case.id, Some(&case.summary), SkipReason::NoSuite);
            return Ok(());
        };

        let mut attrs = TestAttributes::new(&case.summary, suite_id);
        attrs.description = case.description.clone();
        attrs.priority = case
            .priority
            .as_ref()
            .map(|priority| priority.destination_name().to_string());
        let Some(test_id) = self.destination.create_test(&attrs)? else {
            self.skip(&case.id, Some(&case.summary), SkipReason::NotCreated);
            return Ok(());
        };
        self.migrated.insert(case.id.clone(), test_id.clone());
        self.report.tests += 1;
        tracing::debug!(test = %case.id, destination = %test_id, title = %case.summary, "test created");

        let migrated = &self.migrated;
        let assembled = assemble_description(
            case.description.as_deref(),
            &preconditions,
            &steps,
            &|called: &str| migrated.get(called).cloned(),
        );

        let mut declared = case.attachments.clone();
        declared.extend(steps.iter().flat_map(|step| step.attachments.iter().cloned()));
        let description = self.transfer_attachments(&test_id, &declared, assembled)?;

        if description != case.description.as_deref().unwrap_or_default() {
            self.destination
                .update_test(&test_id, &TestAttributes::description_update(description))?;
        }

        self.link_labels(&case, &test_id)?;
        for issue in &case.external_issues {
            if self.destination.link_external_issue(&test_id, issue)? {
                self.report.links += 1;
            }
        }
        Ok(())
    }

    /// Preconditions carried by the case plus linked ones; lookup failures
    /// only cost the linked preconditions
    fn preconditions_of(&mut self, case: &RawTestCase) -> Vec<Precondition> {
        let mut preconditions = case.preconditions.clone();

        let ids = match self.source.fetch_precondition_ids(&case.id) {
            Ok(ids) => ids,
            Err(e) => {
                tracing::debug!(test = %case.id, error = %e, "preconditions unavailable");
                return preconditions;
            }
        };
        for id in ids {
            match self.source.fetch_test_detail(&id) {
                Ok(Some(linked)) => preconditions.push(Precondition {
                    title: Some(linked.summary),
                    description: linked.description.unwrap_or_default(),
                }),
                Ok(None) => tracing::debug!(precondition = %id, "precondition not found"),
                Err(e) => tracing::debug!(precondition = %id, error = %e, "precondition unreadable"),
            }
        }
        preconditions
    }

    /// Upload declared attachments, then any ID reference still left in the
    /// text, and rewrite the references to the uploaded URLs
    fn transfer_attachments(
        &mut self,
        test_id: &str,
        declared: &[AttachmentMeta],
        text: String,
    ) -> Result<String, MigrationError> {
        let mut cache = UploadCache::new();
        let mut substitutions = Vec::new();
        for attachment in declared {
            if let Some(substitution) = self.transfer(test_id, attachment, &mut cache)? {
                substitutions.push(substitution);
            }
        }
        let mut text = rewrite(&text, &substitutions);

        for reference in pending_references(&text) {
            if declared.iter().any(|attachment| attachment.reference == reference) {
                continue;
            }
            let attachment = AttachmentMeta {
                file_name: reference.key().to_string(),
                location: reference.key().to_string(),
                is_image: true,
                reference,
            };
            if let Some(substitution) = self.transfer(test_id, &attachment, &mut cache)? {
                text = rewrite(&text, &[substitution]);
            }
        }
        Ok(text)
    }

    fn transfer(
        &mut self,
        test_id: &str,
        attachment: &AttachmentMeta,
        cache: &mut UploadCache,
    ) -> Result<Option<Substitution>, MigrationError> {
        let path = match self.source.download_attachment(attachment) {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(file = %attachment.file_name, error = %e, "attachment download failed");
                return Ok(None);
            }
        };
        let fingerprint = match fingerprint_file(&path) {
            Ok(fingerprint) => fingerprint,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "attachment unreadable");
                return Ok(None);
            }
        };

        let url = match cache.get(&fingerprint) {
            Some(url) => url.to_string(),
            None => {
                let Some(url) =
                    self.destination
                        .upload_attachment(test_id, &path, &attachment.file_name)?
                else {
                    return Ok(None);
                };
                cache.insert(fingerprint, url.clone());
                self.report.attachments += 1;
                url
            }
        };

        Ok(Some(Substitution::new(
            attachment.reference.clone(),
            url,
            &attachment.file_name,
            attachment.is_image,
        )))
    }

    fn link_labels(&mut self, case: &RawTestCase, test_id: &str) -> Result<(), MigrationError> {
        for label in &case.labels {
            let mut attrs = LabelAttributes::for_tests(&label.title);
            if label.value.is_some() {
                attrs = attrs.with_field(LabelField {
                    kind: "string".to_string(),
                    value: None,
                });
            }

            let Some(label_id) = self.labels.ensure(&mut self.destination, &attrs)? else {
                continue;
            };
            if self
                .destination
                .link_label(&label_id, test_id, label.value.as_deref())?
            {
                self.report.labels += 1;
            }
        }
        Ok(())
    }
}
