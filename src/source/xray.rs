//! Xray (internal API) reader
//!
//! The Xray repository API knows folders, folder contents and test steps. Test
//! details live in Jira, so every detail lookup goes through the wrapped
//! [`JiraClient`]. Every request carries the Jira project id, which is resolved
//! once on the first call.

use std::path::PathBuf;

use reqwest::Method;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{Value, json};
use tempfile::TempDir;

use super::jira::JiraClient;
use super::{AttachmentMeta, ListedTest, RawTestCase, SourceReader, Step, scratch_file_name};
use crate::attachments::AttachmentRef;
use crate::config::XrayConfig;
use crate::error::MigrationError;
use crate::hierarchy::FolderNode;
use crate::http::{build_client, deserialize_id, deserialize_opt_id, download_to, id_string, read_json};

const STEP_PAGE: &str = "startAt=0&maxResults=99";

#[derive(Debug, Deserialize)]
struct Repository {
    #[serde(default)]
    folders: Vec<XrayFolder>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct XrayFolder {
    #[serde(deserialize_with = "deserialize_id")]
    folder_id: String,
    name: String,
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    parent_folder_id: Option<String>,
    #[serde(default)]
    folders: Vec<Value>,
    #[serde(default)]
    tests_count: u64,
}

impl From<XrayFolder> for FolderNode {
    fn from(folder: XrayFolder) -> Self {
        FolderNode {
            id: folder.folder_id,
            name: folder.name,
            parent_id: folder.parent_folder_id,
            child_folder_ids: folder.folders.iter().filter_map(id_string).collect(),
            direct_test_count: folder.tests_count,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FolderTests {
    #[serde(default)]
    folders_tests: Vec<FolderTestIds>,
}

#[derive(Debug, Deserialize)]
struct FolderTestIds {
    #[serde(default)]
    tests: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct StepList {
    #[serde(default)]
    steps: Vec<XrayStep>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct XrayStep {
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    result: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    call_test_issue_id: Option<String>,
    #[serde(default)]
    attachments: Vec<XrayAttachment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct XrayAttachment {
    #[serde(deserialize_with = "deserialize_id")]
    id: String,
    filename: String,
    #[serde(default)]
    mime_type: Option<String>,
}

impl From<XrayStep> for Step {
    fn from(step: XrayStep) -> Self {
        Step {
            action: step.action.unwrap_or_default(),
            data: step.data.filter(|data| !data.is_empty()),
            result: step.result.filter(|result| !result.is_empty()),
            called_test_id: step.call_test_issue_id,
            attachments: step
                .attachments
                .into_iter()
                .map(|attachment| AttachmentMeta {
                    reference: AttachmentRef::XrayId(attachment.id.clone()),
                    is_image: attachment
                        .mime_type
                        .as_deref()
                        .is_some_and(|mime| mime.starts_with("image/")),
                    file_name: attachment.filename,
                    location: attachment.id,
                })
                .collect(),
        }
    }
}

/// Ids of precondition entries, in whichever shape the endpoint returns them
fn precondition_ids(payload: &Value) -> Vec<String> {
    let entries: &[Value] = match payload {
        Value::Array(entries) => entries.as_slice(),
        Value::Object(object) => object
            .get("preconditions")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default(),
        _ => &[],
    };

    entries
        .iter()
        .filter_map(|entry| match entry {
            Value::Object(object) => ["preconditionId", "issueId", "id"]
                .iter()
                .find_map(|key| object.get(*key).and_then(id_string)),
            other => id_string(other),
        })
        .collect()
}

/// Xray test repository source
#[derive(Debug)]
pub struct XraySource {
    client: Client,
    config: XrayConfig,
    jira: JiraClient,
    scratch: TempDir,
}

impl XraySource {
    pub fn new(config: XrayConfig, jira: JiraClient) -> Result<Self, MigrationError> {
        let scratch = tempfile::Builder::new()
            .prefix("xray-attachments-")
            .tempdir()?;
        Ok(Self {
            client: build_client()?,
            config,
            jira,
            scratch,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.endpoint)
    }

    /// Request with the Xray token; POST bodies gain the project id
    fn request(
        &mut self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<RequestBuilder, MigrationError> {
        let project_id = self.jira.project_id()?;
        let url = self.url(path);
        tracing::debug!(%method, url = %url, "xray request");

        let mut request = self
            .client
            .request(method.clone(), &url)
            .header(ACCEPT, "application/json, text/plain, */*")
            .header("x-acpt", &self.config.token);

        if method != Method::GET {
            let mut body = body.unwrap_or_else(|| json!({}));
            if let Value::Object(object) = &mut body {
                object.insert("projectId".to_string(), Value::String(project_id));
            }
            request = request
                .header(CONTENT_TYPE, "application/json;charset=UTF-8")
                .json(&body);
        }
        Ok(request)
    }
}

impl SourceReader for XraySource {
    fn name(&self) -> &'static str {
        "xray"
    }

    fn list_folders(&mut self) -> Result<Vec<FolderNode>, MigrationError> {
        let repository: Repository = read_json(self.request(Method::POST, "/test-repository", None)?)?;
        tracing::info!(count = repository.folders.len(), "Xray folders found");
        Ok(repository.folders.into_iter().map(FolderNode::from).collect())
    }

    fn list_test_cases_in_folder(
        &mut self,
        folder_id: &str,
    ) -> Result<Vec<ListedTest>, MigrationError> {
        let body = json!({ "folderIds": [folder_id] });
        let listing: FolderTests = read_json(self.request(
            Method::POST,
            "/test-repository/get-tests",
            Some(body),
        )?)?;

        Ok(listing
            .folders_tests
            .iter()
            .flat_map(|folder| folder.tests.iter())
            .filter_map(id_string)
            .map(ListedTest::Pending)
            .collect())
    }

    fn fetch_test_detail(&mut self, id: &str) -> Result<Option<RawTestCase>, MigrationError> {
        match self.jira.issue(id)? {
            Some(issue) => self.jira.to_test_case(issue).map(Some),
            None => Ok(None),
        }
    }

    fn fetch_steps(&mut self, id: &str) -> Result<Vec<Step>, MigrationError> {
        let path = format!("/test/{id}/steps?{STEP_PAGE}");
        let list: StepList = read_json(self.request(Method::GET, &path, None)?)?;
        Ok(list.steps.into_iter().map(Step::from).collect())
    }

    fn fetch_precondition_ids(&mut self, id: &str) -> Result<Vec<String>, MigrationError> {
        let path = format!("/test/{id}/preconditions?{STEP_PAGE}");
        let payload: Value = read_json(self.request(Method::GET, &path, None)?)?;
        Ok(precondition_ids(&payload))
    }

    fn download_attachment(
        &mut self,
        attachment: &AttachmentMeta,
    ) -> Result<PathBuf, MigrationError> {
        let path = self
            .scratch
            .path()
            .join(scratch_file_name(&attachment.location, &attachment.file_name));
        let request = self
            .client
            .get(self.url(&format!("/attachments/{}", attachment.location)))
            .query(&[("jwt", self.config.token.as_str())]);
        download_to(request, &path)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_conversion() {
        let repository: Repository = serde_json::from_value(json!({
            "folders": [
                {"folderId": "-1", "name": "Test Repository", "folders": ["5f1"], "testsCount": 0},
                {"folderId": "5f1", "name": "Checkout", "parentFolderId": "-1", "folders": [], "testsCount": 4}
            ]
        }))
        .expect("repository");

        let folders: Vec<FolderNode> = repository.folders.into_iter().map(FolderNode::from).collect();
        assert!(folders[0].is_root());
        assert_eq!(folders[0].child_folder_ids, vec!["5f1"]);
        assert_eq!(folders[1].real_parent_id(), None);
        assert_eq!(folders[1].direct_test_count, 4);
    }

    #[test]
    fn test_folder_tests_listing_accepts_numeric_ids() {
        let listing: FolderTests = serde_json::from_value(json!({
            "foldersTests": [{"folderId": "5f1", "tests": [10001, "10002"]}]
        }))
        .expect("listing");
        let ids: Vec<String> = listing
            .folders_tests
            .iter()
            .flat_map(|folder| folder.tests.iter())
            .filter_map(id_string)
            .collect();
        assert_eq!(ids, vec!["10001", "10002"]);
    }

    #[test]
    fn test_step_conversion() {
        let list: StepList = serde_json::from_value(json!({
            "steps": [
                {
                    "id": "s1",
                    "action": "Upload !xray-attachment://a9|thumbnail!",
                    "data": "",
                    "result": "File listed",
                    "attachments": [{"id": "a9", "filename": "doc.pdf", "mimeType": "application/pdf"}]
                },
                {"id": "s2", "callTestIssueId": 10005}
            ]
        }))
        .expect("steps");

        let steps: Vec<Step> = list.steps.into_iter().map(Step::from).collect();
        assert_eq!(steps[0].data, None);
        assert_eq!(steps[0].result.as_deref(), Some("File listed"));
        assert_eq!(steps[0].attachments[0].reference, AttachmentRef::XrayId("a9".into()));
        assert!(!steps[0].attachments[0].is_image);
        assert_eq!(steps[1].action, "");
        assert_eq!(steps[1].called_test_id.as_deref(), Some("10005"));
    }

    #[test]
    fn test_precondition_id_shapes() {
        assert_eq!(precondition_ids(&json!(["1", 2])), vec!["1", "2"]);
        assert_eq!(
            precondition_ids(&json!({"preconditions": [{"preconditionId": "7"}, {"issueId": 8}]})),
            vec!["7", "8"]
        );
        assert!(precondition_ids(&json!({"total": 0})).is_empty());
        assert!(precondition_ids(&json!(null)).is_empty());
    }
}
