//! Run configuration
//!
//! Each adapter receives an explicit configuration value at construction.
//! Values are read from environment variables through an injectable lookup so
//! tests never touch the process environment. Every required value is
//! validated before any network call; a missing one is a
//! [`MigrationError::Config`].

use std::fmt;

use url::Url;

use crate::error::MigrationError;

/// Default destination host
pub const DEFAULT_TESTOMATIO_HOST: &str = "https://app.testomat.io";
/// Default Xray internal API endpoint
pub const DEFAULT_XRAY_ENDPOINT: &str = "https://eu.xray.cloud.getxray.app/api/internal";
/// Default Jira issue type of precondition issues
pub const DEFAULT_PRECONDITION_ISSUE_TYPE: &str = "Pre-conditions";

const TESTRAIL_ENTRY: &str = "/index.php?";

fn required(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<String, MigrationError> {
    optional(lookup, name)
        .ok_or_else(|| MigrationError::Config(format!("missing required variable {name}")))
}

fn optional(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Destination (Testomat.io) settings
#[derive(Clone, PartialEq, Eq)]
pub struct TestomatioConfig {
    pub token: String,
    pub host: String,
    pub project: String,
}

impl TestomatioConfig {
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self, MigrationError> {
        Ok(Self {
            token: required(lookup, "TESTOMATIO_TOKEN")?,
            host: optional(lookup, "TESTOMATIO_HOST")
                .unwrap_or_else(|| DEFAULT_TESTOMATIO_HOST.to_string()),
            project: required(lookup, "TESTOMATIO_PROJECT")?,
        })
    }

    pub fn from_env() -> Result<Self, MigrationError> {
        Self::from_lookup(&env_lookup)
    }
}

impl fmt::Debug for TestomatioConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestomatioConfig")
            .field("token", &"<redacted>")
            .field("host", &self.host)
            .field("project", &self.project)
            .finish()
    }
}

/// Jira Cloud settings (REST v3)
#[derive(Clone, PartialEq, Eq)]
pub struct JiraConfig {
    pub base_url: Url,
    pub username: String,
    pub token: String,
    pub project_id: String,
    pub precondition_issue_type: String,
}

impl JiraConfig {
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self, MigrationError> {
        let raw_url = required(lookup, "JIRA_URL")?;
        let base_url = Url::parse(&raw_url)
            .map_err(|e| MigrationError::Config(format!("JIRA_URL {raw_url:?} is not a URL: {e}")))?;

        Ok(Self {
            base_url,
            username: required(lookup, "JIRA_USERNAME")?,
            token: required(lookup, "JIRA_TOKEN")?,
            project_id: required(lookup, "JIRA_PROJECT_ID")?,
            precondition_issue_type: optional(lookup, "JIRA_PRECONDITION_ISSUE_TYPE")
                .unwrap_or_else(|| DEFAULT_PRECONDITION_ISSUE_TYPE.to_string()),
        })
    }

    pub fn from_env() -> Result<Self, MigrationError> {
        Self::from_lookup(&env_lookup)
    }
}

impl fmt::Debug for JiraConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JiraConfig")
            .field("base_url", &self.base_url.as_str())
            .field("username", &self.username)
            .field("token", &"<redacted>")
            .field("project_id", &self.project_id)
            .field("precondition_issue_type", &self.precondition_issue_type)
            .finish()
    }
}

/// Xray internal API settings
#[derive(Clone, PartialEq, Eq)]
pub struct XrayConfig {
    pub endpoint: String,
    pub token: String,
    /// Migrate only this folder and its descendants
    pub folder_id: Option<String>,
}

impl XrayConfig {
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self, MigrationError> {
        let endpoint = optional(lookup, "XRAY_URL")
            .unwrap_or_else(|| DEFAULT_XRAY_ENDPOINT.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            endpoint,
            token: required(lookup, "XRAY_INTERNAL_TOKEN")?,
            folder_id: optional(lookup, "XRAY_FOLDER_ID"),
        })
    }

    pub fn from_env() -> Result<Self, MigrationError> {
        Self::from_lookup(&env_lookup)
    }
}

impl fmt::Debug for XrayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XrayConfig")
            .field("endpoint", &self.endpoint)
            .field("token", &"<redacted>")
            .field("folder_id", &self.folder_id)
            .finish()
    }
}

/// TestRail API v2 settings
#[derive(Clone, PartialEq, Eq)]
pub struct TestRailConfig {
    /// Entry point ending in `/index.php?`; API paths are appended verbatim
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub project_id: String,
}

impl TestRailConfig {
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self, MigrationError> {
        let mut base_url = required(lookup, "TESTRAIL_URL")?;
        if !base_url.ends_with(TESTRAIL_ENTRY) {
            base_url = format!("{}{TESTRAIL_ENTRY}", base_url.trim_end_matches('/'));
        }

        Ok(Self {
            base_url,
            username: required(lookup, "TESTRAIL_USERNAME")?,
            password: required(lookup, "TESTRAIL_PASSWORD")?,
            project_id: required(lookup, "TESTRAIL_PROJECT_ID")?,
        })
    }

    pub fn from_env() -> Result<Self, MigrationError> {
        Self::from_lookup(&env_lookup)
    }
}

impl fmt::Debug for TestRailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestRailConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("project_id", &self.project_id)
            .finish()
    }
}

/// Settings that shape the run rather than one adapter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunConfig {
    /// Perform reads but no destination writes
    pub dry_run: bool,
    /// Migrate only this folder and its descendants
    pub folder_id: Option<String>,
}

impl RunConfig {
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Self {
        Self {
            dry_run: optional(lookup, "DRY_RUN").is_some_and(|value| is_truthy(&value)),
            folder_id: None,
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(&env_lookup)
    }
}

/// Any value except `0`, `false` and `no` (case-insensitive) enables a flag
fn is_truthy(value: &str) -> bool {
    !matches!(
        value.to_ascii_lowercase().as_str(),
        "" | "0" | "false" | "no"
    )
}
