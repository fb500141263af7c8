//! Jira Cloud REST v3 reader
//!
//! [`JiraClient`] is shared by two sources: Xray stores tests as Jira issues,
//! so test details (summary, description, priority, attachments) always come
//! from Jira. [`JiraSource`] uses the client alone and imports every `Test`
//! issue of the project into the Root suite, for projects without access to
//! the Xray repository API.

use std::collections::HashMap;
use std::path::PathBuf;

use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde_json::{Map, Value};
use tempfile::TempDir;

use super::{
    AttachmentMeta, ExternalIssue, LabelValue, ListedTest, Priority, RawTestCase, SourceReader,
    Step, scratch_file_name,
};
use crate::attachments::AttachmentRef;
use crate::config::JiraConfig;
use crate::description::convert_description_with;
use crate::converter::MarkdownConverter;
use crate::error::MigrationError;
use crate::hierarchy::{FolderNode, ROOT_FOLDER_ID, ROOT_SUITE_TITLE};
use crate::http::{Page, Paginator, build_client, deserialize_id, download_to, expect_success, read_json};

const API_PREFIX: &str = "rest/api/3";
const SEARCH_PAGE_SIZE: &str = "100";

/// Custom field types carried over as label values
const LABEL_FIELD_TYPES: &[&str] = &["string", "number", "option"];

/// Entry of the custom field catalogue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomField {
    pub id: String,
    pub name: String,
    /// Schema type (`string`, `number`, `option`, `array`, ...)
    pub kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FieldEntry {
    id: String,
    name: String,
    #[serde(default)]
    custom: bool,
    schema: Option<FieldSchema>,
}

#[derive(Debug, Deserialize)]
struct FieldSchema {
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProjectEntry {
    #[serde(deserialize_with = "deserialize_id")]
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchPage {
    #[serde(default)]
    issues: Vec<JiraIssue>,
    next_page_token: Option<String>,
    #[serde(default)]
    is_last: Option<bool>,
}

/// A Jira issue as returned by the issue and search endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct JiraIssue {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub key: String,
    #[serde(default)]
    pub fields: IssueFields,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IssueFields {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: Value,
    pub issuetype: Option<NamedValue>,
    pub priority: Option<NamedValue>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub attachment: Vec<JiraAttachment>,
    #[serde(default)]
    pub issuelinks: Vec<IssueLink>,
    /// Everything else, custom fields included
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedValue {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JiraAttachment {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub filename: String,
    /// Download URL
    pub content: String,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueLink {
    pub inward_issue: Option<LinkedIssue>,
    pub outward_issue: Option<LinkedIssue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkedIssue {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default)]
    pub fields: LinkedIssueFields,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LinkedIssueFields {
    pub issuetype: Option<NamedValue>,
}

/// Authenticated Jira REST client
#[derive(Debug)]
pub struct JiraClient {
    client: Client,
    config: JiraConfig,
    converter: MarkdownConverter,
    paginator: Paginator,
    scratch: TempDir,
    project_id: Option<String>,
    custom_fields: Option<HashMap<String, CustomField>>,
    downloads: u32,
}

impl JiraClient {
    pub fn new(config: JiraConfig) -> Result<Self, MigrationError> {
        let scratch = tempfile::Builder::new()
            .prefix("jira-attachments-")
            .tempdir()?;
        Ok(Self {
            client: build_client()?,
            config,
            converter: MarkdownConverter::new(),
            paginator: Paginator::default(),
            scratch,
            project_id: None,
            custom_fields: None,
            downloads: 0,
        })
    }

    pub fn config(&self) -> &JiraConfig {
        &self.config
    }

    fn api_url(&self, path: &str) -> String {
        format!(
            "{}/{API_PREFIX}/{path}",
            self.config.base_url.as_str().trim_end_matches('/')
        )
    }

    fn get(&self, url: &str) -> RequestBuilder {
        self.client
            .get(url)
            .basic_auth(&self.config.username, Some(&self.config.token))
            .header(ACCEPT, "application/json")
    }

    /// Numeric id of the configured project, fetched once
    pub fn project_id(&mut self) -> Result<String, MigrationError> {
        if let Some(id) = &self.project_id {
            return Ok(id.clone());
        }

        let url = self.api_url(&format!("project/{}", self.config.project_id));
        let project: ProjectEntry = read_json(self.get(&url))?;
        tracing::debug!(project = %project.id, "resolved Jira project id");
        self.project_id = Some(project.id.clone());
        Ok(project.id)
    }

    /// Custom field catalogue keyed by field id, fetched once
    pub fn custom_fields(&mut self) -> Result<&HashMap<String, CustomField>, MigrationError> {
        if self.custom_fields.is_none() {
            let url = self.api_url("field");
            let entries: Vec<FieldEntry> = read_json(self.get(&url))?;
            let fields: HashMap<String, CustomField> = entries
                .into_iter()
                .filter(|entry| entry.custom)
                .map(|entry| {
                    let field = CustomField {
                        id: entry.id.clone(),
                        name: entry.name,
                        kind: entry.schema.and_then(|schema| schema.kind),
                    };
                    (entry.id, field)
                })
                .collect();
            tracing::debug!(count = fields.len(), "custom field catalogue loaded");
            self.custom_fields = Some(fields);
        }
        Ok(self.custom_fields.get_or_insert_with(HashMap::new))
    }

    /// One issue by id or key, `None` when Jira does not know it
    pub fn issue(&mut self, id_or_key: &str) -> Result<Option<JiraIssue>, MigrationError> {
        let url = self.api_url(&format!("issue/{id_or_key}"));
        let response = self.get(&url).send()?;
        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(issue = id_or_key, "issue not found");
            return Ok(None);
        }
        let response = expect_success(response)?;
        let text = response.text()?;
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| MigrationError::decode(url, e))
    }

    /// All issues matching a JQL query
    pub fn search(&mut self, jql: &str) -> Result<Vec<JiraIssue>, MigrationError> {
        let url = self.api_url("search/jql");
        let paginator = self.paginator;
        paginator.collect(|token: Option<&String>| {
            let mut request = self.get(&url).query(&[
                ("jql", jql),
                ("fields", "*all"),
                ("maxResults", SEARCH_PAGE_SIZE),
            ]);
            if let Some(token) = token {
                request = request.query(&[("nextPageToken", token)]);
            }
            let page: SearchPage = read_json(request)?;
            let next = if page.is_last == Some(true) {
                None
            } else {
                page.next_page_token
            };
            Ok(Page {
                items: page.issues,
                next,
            })
        })
    }

    /// Every `Test` issue of the project
    pub fn search_tests(&mut self) -> Result<Vec<JiraIssue>, MigrationError> {
        let jql = format!("project = {} AND issuetype = Test", self.config.project_id);
        self.search(&jql)
    }

    /// Ids of linked issues whose type is the precondition issue type
    pub fn precondition_links(&self, issue: &JiraIssue) -> Vec<String> {
        let precondition_type = self.config.precondition_issue_type.as_str();
        issue
            .fields
            .issuelinks
            .iter()
            .flat_map(|link| [&link.inward_issue, &link.outward_issue])
            .flatten()
            .filter(|linked| {
                linked
                    .fields
                    .issuetype
                    .as_ref()
                    .is_some_and(|kind| kind.name.eq_ignore_ascii_case(precondition_type))
            })
            .map(|linked| linked.id.clone())
            .collect()
    }

    /// Map an issue to a test case, converting its description
    pub fn to_test_case(&mut self, issue: JiraIssue) -> Result<RawTestCase, MigrationError> {
        let description = convert_description_with(&self.converter, &issue.fields.description);
        let labels = self.labels_of(&issue)?;
        let fields = issue.fields;

        let attachments = fields
            .attachment
            .into_iter()
            .map(|attachment| AttachmentMeta {
                is_image: attachment
                    .mime_type
                    .as_deref()
                    .is_some_and(|mime| mime.starts_with("image/")),
                reference: AttachmentRef::FileName(attachment.filename.clone()),
                file_name: attachment.filename,
                location: attachment.content,
            })
            .collect();

        Ok(RawTestCase {
            id: issue.id,
            key: Some(issue.key.clone()),
            summary: fields.summary,
            issue_type: fields.issuetype.map(|kind| kind.name),
            description,
            priority: fields.priority.map(|priority| Priority::Label(priority.name)),
            folder_id: None,
            attachments,
            preconditions: Vec::new(),
            labels,
            external_issues: vec![ExternalIssue::JiraKey(issue.key)],
        })
    }

    /// Plain Jira labels plus scalar custom fields as label values
    fn labels_of(&mut self, issue: &JiraIssue) -> Result<Vec<LabelValue>, MigrationError> {
        let mut labels: Vec<LabelValue> = issue
            .fields
            .labels
            .iter()
            .map(LabelValue::plain)
            .collect();

        let catalogue = self.custom_fields()?;
        for (field_id, value) in &issue.fields.other {
            let Some(field) = catalogue.get(field_id) else {
                continue;
            };
            if !field
                .kind
                .as_deref()
                .is_some_and(|kind| LABEL_FIELD_TYPES.contains(&kind))
            {
                continue;
            }
            if let Some(value) = scalar_field_value(value) {
                labels.push(LabelValue::field(&field.name, value));
            }
        }
        labels.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(labels)
    }

    /// Download one issue attachment into the scratch directory
    pub fn download(&mut self, attachment: &AttachmentMeta) -> Result<PathBuf, MigrationError> {
        self.downloads += 1;
        let path = self
            .scratch
            .path()
            .join(scratch_file_name(&self.downloads.to_string(), &attachment.file_name));
        let request = self
            .client
            .get(&attachment.location)
            .basic_auth(&self.config.username, Some(&self.config.token));
        download_to(request, &path)?;
        Ok(path)
    }
}

/// Text of a string, number or option custom field value
fn scalar_field_value(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Object(option) => option
            .get("value")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

/// Jira-only source: all `Test` issues of the project, in the Root suite
#[derive(Debug)]
pub struct JiraSource {
    jira: JiraClient,
}

impl JiraSource {
    pub fn new(jira: JiraClient) -> Self {
        Self { jira }
    }
}

impl SourceReader for JiraSource {
    fn name(&self) -> &'static str {
        "jira"
    }

    fn list_folders(&mut self) -> Result<Vec<FolderNode>, MigrationError> {
        Ok(vec![FolderNode {
            id: ROOT_FOLDER_ID.to_string(),
            name: ROOT_SUITE_TITLE.to_string(),
            parent_id: None,
            child_folder_ids: Vec::new(),
            direct_test_count: 0,
        }])
    }

    fn list_test_cases_in_folder(
        &mut self,
        folder_id: &str,
    ) -> Result<Vec<ListedTest>, MigrationError> {
        if folder_id != ROOT_FOLDER_ID {
            return Ok(Vec::new());
        }

        let issues = self.jira.search_tests()?;
        tracing::info!(count = issues.len(), "Jira test issues found");
        issues
            .into_iter()
            .map(|issue| {
                self.jira
                    .to_test_case(issue)
                    .map(|case| ListedTest::Loaded(Box::new(case)))
            })
            .collect()
    }

    fn fetch_test_detail(&mut self, id: &str) -> Result<Option<RawTestCase>, MigrationError> {
        match self.jira.issue(id)? {
            Some(issue) => self.jira.to_test_case(issue).map(Some),
            None => Ok(None),
        }
    }

    fn fetch_steps(&mut self, _id: &str) -> Result<Vec<Step>, MigrationError> {
        // Plain Jira issues carry no structured steps
        Ok(Vec::new())
    }

    fn fetch_precondition_ids(&mut self, id: &str) -> Result<Vec<String>, MigrationError> {
        Ok(match self.jira.issue(id)? {
            Some(issue) => self.jira.precondition_links(&issue),
            None => Vec::new(),
        })
    }

    fn download_attachment(
        &mut self,
        attachment: &AttachmentMeta,
    ) -> Result<PathBuf, MigrationError> {
        self.jira.download(attachment)
    }
}
