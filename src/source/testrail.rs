//! TestRail API v2 reader
//!
//! Sections are the folders; they only expose a parent link, so the tree is
//! rebuilt with [`folders_from_parent_links`]. Cases are fetched once per run
//! and served from memory afterwards. A case carries its own preconditions
//! text, steps and references, so no precondition lookups are needed.
//!
//! Listings are paginated through `_links.next`, which holds the next API path
//! relative to the `index.php?` entry point. Older servers return bare arrays
//! without pagination; both shapes are accepted.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tempfile::TempDir;

use super::{
    AttachmentMeta, ExternalIssue, LabelValue, ListedTest, Precondition, Priority, RawTestCase,
    SourceReader, Step, scratch_file_name,
};
use crate::attachments::AttachmentRef;
use crate::config::TestRailConfig;
use crate::error::MigrationError;
use crate::hierarchy::{FolderLink, FolderNode, folders_from_parent_links};
use crate::http::{
    Page, Paginator, build_client, deserialize_id, deserialize_opt_id, download_to, id_string,
    read_json,
};
use crate::priority::{SourcePriority, rescale};

/// Case fields with a dedicated meaning; never turned into labels
const STRUCTURAL_FIELDS: &[&str] = &[
    "custom_preconds",
    "custom_steps",
    "custom_expected",
    "custom_steps_separated",
    "custom_description",
];

/// Case field type ids of the TestRail API
const FIELD_TYPE_CHECKBOX: u64 = 5;
const FIELD_TYPE_DROPDOWN: u64 = 6;
const FIELD_TYPE_MULTI_SELECT: u64 = 12;

#[derive(Debug, Deserialize)]
struct Section {
    #[serde(deserialize_with = "deserialize_id")]
    id: String,
    name: String,
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    parent_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SeparatedStep {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    expected: Option<String>,
    #[serde(default)]
    additional_info: Option<String>,
}

/// A case as returned by `get_cases`
#[derive(Debug, Clone, Deserialize)]
pub struct TestRailCase {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub title: String,
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    pub section_id: Option<String>,
    #[serde(default)]
    pub priority_id: Option<u64>,
    #[serde(default)]
    pub refs: Option<String>,
    /// Every other field, `custom_*` fields included
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl TestRailCase {
    fn text_field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }

    /// Ordered steps from the separated-steps template or the text template
    fn steps(&self) -> Vec<Step> {
        let separated: Vec<SeparatedStep> = self
            .fields
            .get("custom_steps_separated")
            .cloned()
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default();

        if !separated.is_empty() {
            return separated
                .into_iter()
                .map(|step| Step {
                    action: step.content.unwrap_or_default(),
                    data: step.additional_info.filter(|info| !info.trim().is_empty()),
                    result: step.expected.filter(|expected| !expected.trim().is_empty()),
                    ..Default::default()
                })
                .collect();
        }

        match self.text_field("custom_steps") {
            Some(steps) => vec![Step {
                action: steps.to_string(),
                result: self.text_field("custom_expected").map(str::to_string),
                ..Default::default()
            }],
            None => Vec::new(),
        }
    }

    /// `refs` split into tracker links
    fn external_issues(&self) -> Vec<ExternalIssue> {
        self.refs
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|reference| !reference.is_empty())
            .map(|reference| {
                if is_jira_key(reference) {
                    ExternalIssue::JiraKey(reference.to_string())
                } else {
                    ExternalIssue::Reference(reference.to_string())
                }
            })
            .collect()
    }
}

fn is_jira_key(reference: &str) -> bool {
    static JIRA_KEY: OnceLock<Option<Regex>> = OnceLock::new();
    JIRA_KEY
        .get_or_init(|| Regex::new(r"^[A-Z][A-Z0-9_]+-\d+$").ok())
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(reference))
}

/// Entry of the case field catalogue
#[derive(Debug, Clone, Deserialize)]
pub struct CaseField {
    pub system_name: String,
    pub label: String,
    #[serde(default)]
    pub type_id: u64,
    #[serde(default)]
    pub configs: Vec<CaseFieldConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaseFieldConfig {
    #[serde(default)]
    pub options: CaseFieldOptions,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CaseFieldOptions {
    /// Dropdown items as `id, label` lines
    #[serde(default)]
    pub items: Option<String>,
}

impl CaseField {
    /// Label of a dropdown item id
    fn item_label(&self, id: &str) -> Option<String> {
        self.configs
            .iter()
            .filter_map(|config| config.options.items.as_deref())
            .flat_map(str::lines)
            .filter_map(|line| line.split_once(','))
            .find(|(item_id, _)| item_id.trim() == id)
            .map(|(_, label)| label.trim().to_string())
    }

    /// Label carrying this field's value for one case
    fn label_for(&self, value: &Value) -> Option<LabelValue> {
        match (self.type_id, value) {
            (_, Value::Null) => None,
            (FIELD_TYPE_CHECKBOX, Value::Bool(true)) => Some(LabelValue::plain(&self.label)),
            (FIELD_TYPE_CHECKBOX, _) => None,
            (FIELD_TYPE_DROPDOWN, value) => {
                let id = id_string(value)?;
                let text = self.item_label(&id).unwrap_or(id);
                Some(LabelValue::field(&self.label, text))
            }
            (FIELD_TYPE_MULTI_SELECT, Value::Array(ids)) => {
                let texts: Vec<String> = ids
                    .iter()
                    .filter_map(id_string)
                    .map(|id| self.item_label(&id).unwrap_or(id))
                    .collect();
                (!texts.is_empty()).then(|| LabelValue::field(&self.label, texts.join(", ")))
            }
            (_, Value::String(text)) if !text.trim().is_empty() => {
                Some(LabelValue::field(&self.label, text.trim()))
            }
            (_, Value::Number(number)) => Some(LabelValue::field(&self.label, number.to_string())),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TestRailAttachment {
    #[serde(deserialize_with = "deserialize_id")]
    id: String,
    #[serde(alias = "filename")]
    name: String,
    #[serde(default)]
    is_image: bool,
}

/// TestRail project source
#[derive(Debug)]
pub struct TestRailSource {
    client: Client,
    config: TestRailConfig,
    paginator: Paginator,
    scratch: TempDir,
    cases: Option<Vec<TestRailCase>>,
    priorities: Option<BTreeMap<u64, i8>>,
    case_fields: Option<HashMap<String, CaseField>>,
}

impl TestRailSource {
    pub fn new(config: TestRailConfig) -> Result<Self, MigrationError> {
        let scratch = tempfile::Builder::new()
            .prefix("testrail-attachments-")
            .tempdir()?;
        Ok(Self {
            client: build_client()?,
            config,
            paginator: Paginator::default(),
            scratch,
            cases: None,
            priorities: None,
            case_fields: None,
        })
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(format!("{}{path}", self.config.base_url))
            .basic_auth(&self.config.username, Some(&self.config.password))
            .header(CONTENT_TYPE, "application/json")
    }

    /// Every item of a listing, following `_links.next`
    fn fetch_all<T: DeserializeOwned>(
        &self,
        path: &str,
        field: &str,
    ) -> Result<Vec<T>, MigrationError> {
        let values = self.paginator.collect(|cursor: Option<&String>| {
            let path = cursor.map(String::as_str).unwrap_or(path);
            let payload: Value = read_json(self.get(path))?;
            Ok(listing_page(payload, field))
        })?;

        values
            .into_iter()
            .map(|value| {
                serde_json::from_value(value).map_err(|e| MigrationError::decode(path, e))
            })
            .collect()
    }

    fn cases(&mut self) -> Result<&[TestRailCase], MigrationError> {
        if self.cases.is_none() {
            let path = format!("/api/v2/get_cases/{}", self.config.project_id);
            let cases: Vec<TestRailCase> = self.fetch_all(&path, "cases")?;
            tracing::info!(count = cases.len(), "TestRail cases fetched");
            self.cases = Some(cases);
        }
        Ok(self.cases.as_deref().unwrap_or_default())
    }

    fn priority_levels(&mut self) -> Result<&BTreeMap<u64, i8>, MigrationError> {
        if self.priorities.is_none() {
            let priorities: Vec<SourcePriority> = read_json(self.get("/api/v2/get_priorities"))?;
            self.priorities = Some(rescale(&priorities));
        }
        Ok(self.priorities.get_or_insert_with(BTreeMap::new))
    }

    fn case_fields(&mut self) -> Result<&HashMap<String, CaseField>, MigrationError> {
        if self.case_fields.is_none() {
            let fields: Vec<CaseField> = read_json(self.get("/api/v2/get_case_fields"))?;
            self.case_fields = Some(
                fields
                    .into_iter()
                    .map(|field| {
                        let name = field.system_name.trim_start_matches("custom_");
                        (format!("custom_{name}"), field)
                    })
                    .collect(),
            );
        }
        Ok(self.case_fields.get_or_insert_with(HashMap::new))
    }

    fn attachments_for_case(&self, case_id: &str) -> Result<Vec<AttachmentMeta>, MigrationError> {
        let path = format!("/api/v2/get_attachments_for_case/{case_id}");
        let attachments: Vec<TestRailAttachment> = self.fetch_all(&path, "attachments")?;
        Ok(attachments
            .into_iter()
            .map(|attachment| AttachmentMeta {
                reference: AttachmentRef::TestRailId(attachment.id.clone()),
                file_name: attachment.name,
                location: attachment.id,
                is_image: attachment.is_image,
            })
            .collect())
    }

    fn to_test_case(&mut self, case: &TestRailCase) -> Result<RawTestCase, MigrationError> {
        let priority = match case.priority_id {
            Some(id) => self.priority_levels()?.get(&id).copied().map(Priority::Level),
            None => None,
        };

        let fields = self.case_fields()?;
        let mut labels: Vec<LabelValue> = case
            .fields
            .iter()
            .filter(|(name, _)| {
                name.starts_with("custom_") && !STRUCTURAL_FIELDS.contains(&name.as_str())
            })
            .filter_map(|(name, value)| fields.get(name)?.label_for(value))
            .collect();
        labels.sort_by(|a, b| a.title.cmp(&b.title));

        let preconditions = case
            .text_field("custom_preconds")
            .map(|text| {
                vec![Precondition {
                    title: None,
                    description: text.to_string(),
                }]
            })
            .unwrap_or_default();

        Ok(RawTestCase {
            id: case.id.clone(),
            key: Some(format!("C{}", case.id)),
            summary: case.title.clone(),
            issue_type: None,
            description: case.text_field("custom_description").map(str::to_string),
            priority,
            folder_id: case.section_id.clone(),
            attachments: self.attachments_for_case(&case.id)?,
            preconditions,
            labels,
            external_issues: case.external_issues(),
        })
    }

    fn find_case(&mut self, id: &str) -> Result<Option<TestRailCase>, MigrationError> {
        let id = id.trim_start_matches('C');
        Ok(self.cases()?.iter().find(|case| case.id == id).cloned())
    }
}

/// Items and next path of one listing response
fn listing_page(payload: Value, field: &str) -> Page<Value, String> {
    match payload {
        Value::Array(items) => Page { items, next: None },
        Value::Object(mut object) => {
            let next = object
                .get("_links")
                .and_then(|links| links.get("next"))
                .and_then(Value::as_str)
                .filter(|next| !next.is_empty())
                .map(str::to_string);
            let items = match object.remove(field) {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            };
            Page { items, next }
        }
        _ => Page {
            items: Vec::new(),
            next: None,
        },
    }
}

impl SourceReader for TestRailSource {
    fn name(&self) -> &'static str {
        "testrail"
    }

    fn list_folders(&mut self) -> Result<Vec<FolderNode>, MigrationError> {
        let path = format!("/api/v2/get_sections/{}", self.config.project_id);
        let sections: Vec<Section> = self.fetch_all(&path, "sections")?;

        let mut counts: HashMap<String, u64> = HashMap::new();
        for case in self.cases()? {
            if let Some(section) = &case.section_id {
                *counts.entry(section.clone()).or_default() += 1;
            }
        }

        let links: Vec<FolderLink> = sections
            .into_iter()
            .map(|section| FolderLink {
                id: section.id,
                name: section.name,
                parent_id: section.parent_id,
            })
            .collect();
        tracing::info!(count = links.len(), "TestRail sections found");
        Ok(folders_from_parent_links(&links, &counts))
    }

    fn list_test_cases_in_folder(
        &mut self,
        folder_id: &str,
    ) -> Result<Vec<ListedTest>, MigrationError> {
        let in_section: Vec<TestRailCase> = self
            .cases()?
            .iter()
            .filter(|case| case.section_id.as_deref() == Some(folder_id))
            .cloned()
            .collect();

        in_section
            .iter()
            .map(|case| {
                self.to_test_case(case)
                    .map(|case| ListedTest::Loaded(Box::new(case)))
            })
            .collect()
    }

    fn fetch_test_detail(&mut self, id: &str) -> Result<Option<RawTestCase>, MigrationError> {
        match self.find_case(id)? {
            Some(case) => self.to_test_case(&case).map(Some),
            None => Ok(None),
        }
    }

    fn fetch_steps(&mut self, id: &str) -> Result<Vec<Step>, MigrationError> {
        Ok(self
            .find_case(id)?
            .map(|case| case.steps())
            .unwrap_or_default())
    }

    fn fetch_precondition_ids(&mut self, _id: &str) -> Result<Vec<String>, MigrationError> {
        // Preconditions are part of the case itself
        Ok(Vec::new())
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
            .get(format!(
                "{}/api/v2/get_attachment/{}",
                self.config.base_url, attachment.location
            ))
            .basic_auth(&self.config.username, Some(&self.config.password));
        download_to(request, &path)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn case(value: Value) -> TestRailCase {
        serde_json::from_value(value).expect("case")
    }

    #[test]
    fn test_listing_page_shapes() {
        let page = listing_page(
            json!({
                "offset": 0,
                "_links": {"next": "/api/v2/get_cases/1&offset=250", "prev": null},
                "cases": [{"id": 1}]
            }),
            "cases",
        );
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.next.as_deref(), Some("/api/v2/get_cases/1&offset=250"));

        let last = listing_page(json!({"_links": {"next": null}, "cases": []}), "cases");
        assert_eq!(last.next, None);

        let legacy = listing_page(json!([{"id": 1}, {"id": 2}]), "cases");
        assert_eq!(legacy.items.len(), 2);
        assert_eq!(legacy.next, None);
    }

    #[test]
    fn test_separated_steps() {
        let case = case(json!({
            "id": 11,
            "title": "Pay by card",
            "section_id": 3,
            "custom_steps_separated": [
                {"content": "Enter card", "expected": "Accepted", "additional_info": "4111 1111"},
                {"content": "Confirm", "expected": ""}
            ]
        }));
        let steps = case.steps();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].data.as_deref(), Some("4111 1111"));
        assert_eq!(steps[0].result.as_deref(), Some("Accepted"));
        assert_eq!(steps[1].result, None);
        assert_eq!(case.section_id.as_deref(), Some("3"));
    }

    #[test]
    fn test_text_template_steps() {
        let case = case(json!({
            "id": 12,
            "title": "Refund",
            "custom_steps": "1. Open order\n2. Refund",
            "custom_expected": "Money returned"
        }));
        let steps = case.steps();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].action, "1. Open order\n2. Refund");
        assert_eq!(steps[0].result.as_deref(), Some("Money returned"));

        assert!(case_without_steps().steps().is_empty());
    }

    fn case_without_steps() -> TestRailCase {
        case(json!({"id": 13, "title": "Empty"}))
    }

    #[test]
    fn test_refs_become_external_issues() {
        let case = case(json!({"id": 1, "title": "t", "refs": "QA-12, https://bugs.example/9 ,, RQ-3"}));
        assert_eq!(
            case.external_issues(),
            vec![
                ExternalIssue::JiraKey("QA-12".into()),
                ExternalIssue::Reference("https://bugs.example/9".into()),
                ExternalIssue::JiraKey("RQ-3".into()),
            ]
        );
        assert!(case_without_steps().external_issues().is_empty());
    }

    #[test]
    fn test_case_field_labels() {
        let dropdown: CaseField = serde_json::from_value(json!({
            "system_name": "custom_automation_type",
            "label": "Automation Type",
            "type_id": 6,
            "configs": [{"options": {"items": "0, None\n1, Ranorex\n2, Playwright"}}]
        }))
        .expect("field");
        assert_eq!(
            dropdown.label_for(&json!(2)),
            Some(LabelValue::field("Automation Type", "Playwright"))
        );
        assert_eq!(
            dropdown.label_for(&json!(9)),
            Some(LabelValue::field("Automation Type", "9"))
        );
        assert_eq!(dropdown.label_for(&json!(null)), None);

        let checkbox: CaseField = serde_json::from_value(json!({
            "system_name": "custom_flaky", "label": "Flaky", "type_id": 5
        }))
        .expect("field");
        assert_eq!(checkbox.label_for(&json!(true)), Some(LabelValue::plain("Flaky")));
        assert_eq!(checkbox.label_for(&json!(false)), None);

        let multi: CaseField = serde_json::from_value(json!({
            "system_name": "custom_browsers",
            "label": "Browsers",
            "type_id": 12,
            "configs": [{"options": {"items": "1, Chrome\n2, Firefox"}}]
        }))
        .expect("field");
        assert_eq!(
            multi.label_for(&json!([1, 2])),
            Some(LabelValue::field("Browsers", "Chrome, Firefox"))
        );
        assert_eq!(multi.label_for(&json!([])), None);
    }

    #[test]
    fn test_jira_key_detection() {
        assert!(is_jira_key("QA-1"));
        assert!(is_jira_key("AB_C2-345"));
        assert!(!is_jira_key("qa-1"));
        assert!(!is_jira_key("https://x/QA-1"));
    }
}
