//! Destination writer
//!
//! The destination is a test-management service with a JSON:API style REST
//! interface: resources are sent as `{"data": {"type": ..., "attributes":
//! {...}}}` and come back with an `id`. Suites are typed `folder` (pure
//! container) or `file` (holds tests).
//!
//! Writes follow one policy: a call that fails with a non-retryable status
//! yields `None`/`false` and the run continues; a call that keeps failing
//! transiently exhausts its [`RetryPolicy`] and aborts the run.

use std::collections::HashMap;
use std::path::Path;

use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, Response};
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::config::TestomatioConfig;
use crate::error::MigrationError;
use crate::http::{Attempt, RetryPolicy, build_client, id_string, read_json};
use crate::source::ExternalIssue;

/// Destination suite type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// Container of other suites
    Folder,
    /// Holds tests directly
    File,
}

/// Suite attributes; unset fields are left out of the request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SuiteAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "file-type", skip_serializing_if = "Option::is_none")]
    pub file_type: Option<FileType>,
    #[serde(rename = "parent-id", skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
}

impl SuiteAttributes {
    pub fn new(title: impl Into<String>, file_type: FileType) -> Self {
        Self {
            title: Some(title.into()),
            file_type: Some(file_type),
            ..Default::default()
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Update that only moves a suite under a new parent
    pub fn parent_link(parent_id: impl Into<String>) -> Self {
        Self {
            parent_id: Some(parent_id.into()),
            ..Default::default()
        }
    }
}

/// Test attributes; unset fields are left out of the request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TestAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "suite-id", skip_serializing_if = "Option::is_none")]
    pub suite_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
}

impl TestAttributes {
    pub fn new(title: impl Into<String>, suite_id: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            suite_id: Some(suite_id.into()),
            ..Default::default()
        }
    }

    /// Update that only replaces the description
    pub fn description_update(description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            ..Default::default()
        }
    }
}

/// Custom field carried by a label
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelField {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Label attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelAttributes {
    pub title: String,
    pub scope: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<LabelField>,
}

impl LabelAttributes {
    /// Label applicable to tests
    pub fn for_tests(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            scope: vec!["tests".to_string()],
            field: None,
        }
    }

    pub fn with_field(mut self, field: LabelField) -> Self {
        self.field = Some(field);
        self
    }
}

/// An existing destination label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub id: String,
    pub title: String,
}

/// Write side of a migration
pub trait DestinationWriter {
    fn create_suite(&mut self, attrs: &SuiteAttributes) -> Result<Option<String>, MigrationError>;

    fn update_suite(&mut self, id: &str, attrs: &SuiteAttributes) -> Result<bool, MigrationError>;

    fn create_test(&mut self, attrs: &TestAttributes) -> Result<Option<String>, MigrationError>;

    fn update_test(&mut self, id: &str, attrs: &TestAttributes) -> Result<bool, MigrationError>;

    /// Upload a file to a test, returning its public URL
    fn upload_attachment(
        &mut self,
        test_id: &str,
        path: &Path,
        name: &str,
    ) -> Result<Option<String>, MigrationError>;

    fn list_labels(&mut self) -> Result<Vec<Label>, MigrationError>;

    fn create_label(&mut self, attrs: &LabelAttributes) -> Result<Option<String>, MigrationError>;

    fn link_label(
        &mut self,
        label_id: &str,
        test_id: &str,
        value: Option<&str>,
    ) -> Result<bool, MigrationError>;

    fn link_external_issue(
        &mut self,
        test_id: &str,
        issue: &ExternalIssue,
    ) -> Result<bool, MigrationError>;
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    jwt: String,
}

#[derive(Debug, Deserialize)]
struct ResourceEnvelope {
    data: Resource,
}

#[derive(Debug, Deserialize)]
struct Resource {
    id: Value,
}

#[derive(Debug, Deserialize)]
struct LabelList {
    #[serde(default)]
    data: Vec<LabelResource>,
}

#[derive(Debug, Deserialize)]
struct LabelResource {
    id: Value,
    #[serde(default)]
    attributes: LabelResourceAttributes,
}

#[derive(Debug, Default, Deserialize)]
struct LabelResourceAttributes {
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: String,
}

/// REST client for the destination service
#[derive(Debug)]
pub struct TestomatioClient {
    client: Client,
    config: TestomatioConfig,
    retry: RetryPolicy,
    jwt: Option<String>,
    dry_run: bool,
    synthetic_ids: u64,
}

impl TestomatioClient {
    /// Create a client; call [`TestomatioClient::login`] before writing
    pub fn new(config: TestomatioConfig, dry_run: bool) -> Result<Self, MigrationError> {
        Ok(Self {
            client: build_client()?,
            config,
            retry: RetryPolicy::default(),
            jwt: None,
            dry_run,
            synthetic_ids: 0,
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Exchange the API token for a session token
    pub fn login(&mut self) -> Result<(), MigrationError> {
        if self.dry_run {
            tracing::info!("dry run: skipping destination login");
            return Ok(());
        }

        let url = format!("{}/api/login", self.config.host.trim_end_matches('/'));
        let response: LoginResponse = read_json(
            self.client
                .post(&url)
                .form(&[("api_token", self.config.token.as_str())]),
        )?;
        self.jwt = Some(response.jwt);
        tracing::info!(project = %self.config.project, "logged in to destination");
        Ok(())
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/api/{}/{}",
            self.config.host.trim_end_matches('/'),
            self.config.project,
            path
        )
    }

    fn synthetic_id(&mut self, kind: &str) -> String {
        self.synthetic_ids += 1;
        format!("dry-{kind}-{}", self.synthetic_ids)
    }

    fn send_with_retry(
        &self,
        url: &str,
        send: impl Fn(&Client, &str) -> Result<Response, reqwest::Error>,
    ) -> Result<Option<Response>, MigrationError> {
        let jwt = self.jwt.clone().unwrap_or_default();
        let client = &self.client;
        self.retry.run(url, || {
            Attempt::from_response(send(client, &jwt))
        })
    }

    fn post_resource(
        &mut self,
        path: &str,
        kind: &str,
        attributes: &impl Serialize,
    ) -> Result<Option<String>, MigrationError> {
        if self.dry_run {
            let id = self.synthetic_id(kind);
            tracing::info!(kind, id = %id, "dry run: resource not created");
            return Ok(Some(id));
        }

        let url = self.endpoint(path);
        let body = json!({"data": {"type": kind, "attributes": attributes}});
        let response = self.send_with_retry(&url, |client, jwt| {
            client
                .post(&url)
                .header(AUTHORIZATION, jwt)
                .json(&body)
                .send()
        })?;

        let Some(response) = response else {
            return Ok(None);
        };
        match response.json::<ResourceEnvelope>() {
            Ok(envelope) => Ok(id_string(&envelope.data.id)),
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "created resource without a readable id");
                Ok(None)
            }
        }
    }

    fn put_resource(
        &mut self,
        path: &str,
        id: &str,
        kind: &str,
        attributes: &impl Serialize,
    ) -> Result<bool, MigrationError> {
        if self.dry_run {
            tracing::info!(kind, id, "dry run: resource not updated");
            return Ok(true);
        }

        let url = self.endpoint(&format!("{path}/{id}"));
        let body = json!({"data": {"type": kind, "attributes": attributes}});
        let response = self.send_with_retry(&url, |client, jwt| {
            client
                .put(&url)
                .header(AUTHORIZATION, jwt)
                .json(&body)
                .send()
        })?;
        Ok(response.is_some())
    }

    fn post_plain(&mut self, path: &str, body: Value) -> Result<bool, MigrationError> {
        if self.dry_run {
            tracing::info!(path, "dry run: link not created");
            return Ok(true);
        }

        let url = self.endpoint(path);
        let response = self.send_with_retry(&url, |client, jwt| {
            client
                .post(&url)
                .header(AUTHORIZATION, jwt)
                .json(&body)
                .send()
        })?;
        Ok(response.is_some())
    }
}

impl DestinationWriter for TestomatioClient {
    fn create_suite(&mut self, attrs: &SuiteAttributes) -> Result<Option<String>, MigrationError> {
        self.post_resource("suites", "suites", attrs)
    }

    fn update_suite(&mut self, id: &str, attrs: &SuiteAttributes) -> Result<bool, MigrationError> {
        self.put_resource("suites", id, "suites", attrs)
    }

    fn create_test(&mut self, attrs: &TestAttributes) -> Result<Option<String>, MigrationError> {
        self.post_resource("tests", "tests", attrs)
    }

    fn update_test(&mut self, id: &str, attrs: &TestAttributes) -> Result<bool, MigrationError> {
        self.put_resource("tests", id, "tests", attrs)
    }

    fn upload_attachment(
        &mut self,
        test_id: &str,
        path: &Path,
        name: &str,
    ) -> Result<Option<String>, MigrationError> {
        if !path.is_file() {
            tracing::warn!(path = %path.display(), "attachment file not found, can't upload");
            return Ok(None);
        }
        if self.dry_run {
            let id = self.synthetic_id("attachment");
            return Ok(Some(format!("https://dry-run.invalid/{id}/{name}")));
        }

        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "attachment unreadable");
                return Ok(None);
            }
        };

        let url = self.endpoint(&format!("tests/{test_id}/attachment"));
        let response = self.send_with_retry(&url, |client, jwt| {
            // A multipart body is consumed by sending, so build one per attempt
            let part = Part::bytes(bytes.clone()).file_name(name.to_string());
            client
                .post(&url)
                .header(AUTHORIZATION, jwt)
                .multipart(Form::new().part("file", part))
                .send()
        })?;

        let Some(response) = response else {
            return Ok(None);
        };
        match response.json::<UploadResponse>() {
            Ok(upload) => {
                tracing::debug!(test_id, name, url = %upload.url, "attachment uploaded");
                Ok(Some(upload.url))
            }
            Err(e) => {
                tracing::warn!(name, error = %e, "upload response without a URL");
                Ok(None)
            }
        }
    }

    fn list_labels(&mut self) -> Result<Vec<Label>, MigrationError> {
        if self.dry_run {
            return Ok(Vec::new());
        }

        let jwt = self.jwt.clone().unwrap_or_default();
        let list: LabelList = read_json(
            self.client
                .get(self.endpoint("labels"))
                .header(AUTHORIZATION, jwt),
        )?;
        Ok(list
            .data
            .into_iter()
            .filter_map(|label| {
                Some(Label {
                    id: id_string(&label.id)?,
                    title: label.attributes.title,
                })
            })
            .collect())
    }

    fn create_label(&mut self, attrs: &LabelAttributes) -> Result<Option<String>, MigrationError> {
        self.post_resource("labels", "label", attrs)
    }

    fn link_label(
        &mut self,
        label_id: &str,
        test_id: &str,
        value: Option<&str>,
    ) -> Result<bool, MigrationError> {
        let mut body = json!({"test_id": test_id});
        if let Some(value) = value {
            body["value"] = Value::String(value.to_string());
        }
        self.post_plain(&format!("labels/{label_id}/link"), body)
    }

    fn link_external_issue(
        &mut self,
        test_id: &str,
        issue: &ExternalIssue,
    ) -> Result<bool, MigrationError> {
        match issue {
            ExternalIssue::JiraKey(key) => {
                self.post_plain("jira/issues", json!({"test_id": test_id, "jira_id": key}))
            }
            ExternalIssue::Reference(reference) => self.post_plain(
                "ims/issues/link",
                json!({"test_id": test_id, "url": reference}),
            ),
        }
    }
}

/// Label ids by title, loaded from the destination once
///
/// Two labels with the same title are the same label, whatever their field
/// type or scope.
#[derive(Debug, Default)]
pub struct LabelRegistry {
    by_title: HashMap<String, String>,
    loaded: bool,
}

impl LabelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the label titled `title`, creating it when missing
    pub fn ensure(
        &mut self,
        writer: &mut dyn DestinationWriter,
        attrs: &LabelAttributes,
    ) -> Result<Option<String>, MigrationError> {
        if !self.loaded {
            for label in writer.list_labels()? {
                self.by_title.entry(label.title).or_insert(label.id);
            }
            self.loaded = true;
        }

        if let Some(id) = self.by_title.get(&attrs.title) {
            return Ok(Some(id.clone()));
        }

        let id = writer.create_label(attrs)?;
        match &id {
            Some(id) => {
                tracing::info!(title = %attrs.title, id = %id, "label created");
                self.by_title.insert(attrs.title.clone(), id.clone());
            }
            None => tracing::warn!(title = %attrs.title, "label not created"),
        }
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.by_title.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_title.is_empty()
    }
}
