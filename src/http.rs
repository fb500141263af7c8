//! Shared HTTP plumbing for source and destination clients
//!
//! All clients use a blocking `reqwest` client: the run is a single control
//! flow that waits on every network call.
//!
//! Two policies live here:
//!
//! - [`RetryPolicy`] for destination writes. Rate limiting (429), server
//!   errors (5xx) and transport failures are retried after a fixed cooldown,
//!   a bounded number of times. Exhausting the attempts is fatal for the run.
//!   Any other non-success status is logged and reported as "no result".
//! - [`Paginator`] for source reads. It follows next-page cursors and stops on
//!   a missing cursor, a repeated cursor or a page cap.
//!
//! Reads are never retried; a failed read surfaces as
//! [`MigrationError::Http`] with the status and body text.

use std::fmt;
use std::fs::File;
use std::path::Path;
use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::MigrationError;

/// Attempts per destination write
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Wait between attempts after a transient failure
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);
/// Page limit for one paginated listing
pub const DEFAULT_PAGE_CAP: usize = 500;
/// Per-request timeout (attachments can be large)
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

const USER_AGENT: &str = concat!("testcase-migrator/", env!("CARGO_PKG_VERSION"));

/// Build the blocking client shared by one adapter
///
/// # Errors
///
/// Returns [`MigrationError::Transport`] when the client cannot be built
/// (e.g. TLS backend initialization failure).
pub fn build_client() -> Result<Client, MigrationError> {
    Ok(Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()?)
}

/// How a status code is handled by a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    RateLimited,
    ServerError,
    Rejected,
}

/// Classify an HTTP status for the write retry policy
pub fn classify_status(status: u16) -> StatusClass {
    match status {
        200..=299 => StatusClass::Success,
        429 => StatusClass::RateLimited,
        500..=599 => StatusClass::ServerError,
        _ => StatusClass::Rejected,
    }
}

/// Why an attempt should be repeated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryReason {
    RateLimited,
    Server { status: u16, body: String },
    Transport(String),
}

impl fmt::Display for RetryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryReason::RateLimited => write!(f, "rate limited"),
            RetryReason::Server { status, body } => write!(f, "status {status}: {body}"),
            RetryReason::Transport(message) => write!(f, "transport error: {message}"),
        }
    }
}

/// Outcome of one write attempt
#[derive(Debug)]
pub enum Attempt<T> {
    /// Final success
    Done(T),
    /// Final failure that is not worth repeating
    Rejected { status: u16, body: String },
    /// Transient failure
    Retry(RetryReason),
}

impl Attempt<Response> {
    /// Classify the result of sending a request
    pub fn from_response(result: Result<Response, reqwest::Error>) -> Self {
        let response = match result {
            Ok(response) => response,
            Err(e) => return Attempt::Retry(RetryReason::Transport(e.to_string())),
        };

        let status = response.status().as_u16();
        match classify_status(status) {
            StatusClass::Success => Attempt::Done(response),
            StatusClass::RateLimited => Attempt::Retry(RetryReason::RateLimited),
            StatusClass::ServerError => Attempt::Retry(RetryReason::Server {
                status,
                body: response.text().unwrap_or_default(),
            }),
            StatusClass::Rejected => Attempt::Rejected {
                status,
                body: response.text().unwrap_or_default(),
            },
        }
    }
}

/// Fixed-cooldown bounded retry for destination writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub cooldown: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}

impl RetryPolicy {
    /// Policy without waiting between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            cooldown: Duration::ZERO,
        }
    }

    /// Run `attempt` until it succeeds, is rejected or runs out of attempts
    ///
    /// Returns `Ok(Some(_))` on success and `Ok(None)` on a rejection.
    ///
    /// # Errors
    ///
    /// [`MigrationError::RateLimited`] when the last attempt was rate limited,
    /// [`MigrationError::WriteFailed`] for other exhausted transient failures.
    pub fn run<T>(
        &self,
        url: &str,
        mut attempt: impl FnMut() -> Attempt<T>,
    ) -> Result<Option<T>, MigrationError> {
        let max_attempts = self.max_attempts.max(1);
        let mut last_reason = None;

        for attempt_number in 1..=max_attempts {
            match attempt() {
                Attempt::Done(value) => return Ok(Some(value)),
                Attempt::Rejected { status, body } => {
                    tracing::warn!(url, status, body = %body, "write rejected");
                    return Ok(None);
                }
                Attempt::Retry(reason) => {
                    tracing::warn!(
                        url,
                        attempt = attempt_number,
                        max_attempts,
                        reason = %reason,
                        "transient write failure"
                    );
                    if attempt_number < max_attempts && !self.cooldown.is_zero() {
                        tracing::info!(seconds = self.cooldown.as_secs(), "cooling down before retry");
                        thread::sleep(self.cooldown);
                    }
                    last_reason = Some(reason);
                }
            }
        }

        Err(match last_reason {
            Some(RetryReason::RateLimited) => MigrationError::RateLimited {
                attempts: max_attempts,
                url: url.to_string(),
            },
            Some(reason) => MigrationError::WriteFailed {
                url: url.to_string(),
                reason: reason.to_string(),
            },
            None => MigrationError::WriteFailed {
                url: url.to_string(),
                reason: "no attempt made".to_string(),
            },
        })
    }
}

/// One page of a paginated listing
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T, C> {
    pub items: Vec<T>,
    /// Cursor of the next page, `None` on the last page
    pub next: Option<C>,
}

/// Cursor-following page collector with loop protection
#[derive(Debug, Clone, Copy)]
pub struct Paginator {
    max_pages: usize,
}

impl Default for Paginator {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_CAP)
    }
}

impl Paginator {
    pub fn new(max_pages: usize) -> Self {
        Self { max_pages }
    }

    /// Fetch pages until the cursor runs out
    ///
    /// `fetch` receives `None` for the first page and the previous page's
    /// cursor afterwards.
    ///
    /// ```
    /// use testcase_migrator::http::{Page, Paginator};
    ///
    /// let pages = [vec![1, 2], vec![3]];
    /// let items = Paginator::default()
    ///     .collect(|cursor: Option<&usize>| {
    ///         let index = cursor.copied().unwrap_or(0);
    ///         Ok(Page {
    ///             items: pages[index].clone(),
    ///             next: (index + 1 < pages.len()).then_some(index + 1),
    ///         })
    ///     })
    ///     .unwrap();
    /// assert_eq!(items, vec![1, 2, 3]);
    /// ```
    pub fn collect<T, C>(
        &self,
        mut fetch: impl FnMut(Option<&C>) -> Result<Page<T, C>, MigrationError>,
    ) -> Result<Vec<T>, MigrationError>
    where
        C: PartialEq + Clone + fmt::Debug,
    {
        let mut items = Vec::new();
        let mut cursor: Option<C> = None;
        let mut seen: Vec<C> = Vec::new();
        let mut pages = 0;

        loop {
            if pages >= self.max_pages {
                tracing::warn!(pages, "page cap reached, listing may be incomplete");
                break;
            }

            let page = fetch(cursor.as_ref())?;
            pages += 1;
            items.extend(page.items);

            match page.next {
                None => break,
                Some(next) if seen.contains(&next) => {
                    tracing::warn!(cursor = ?next, "repeated page cursor, stopping");
                    break;
                }
                Some(next) => {
                    seen.push(next.clone());
                    cursor = Some(next);
                }
            }
        }

        tracing::debug!(pages, items = items.len(), "listing fetched");
        Ok(items)
    }
}

/// Fail a read with its status and body text unless it succeeded
pub fn expect_success(response: Response) -> Result<Response, MigrationError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().to_string();
    let body = response.text().unwrap_or_default();
    Err(MigrationError::Http {
        status: status.as_u16(),
        url,
        body,
    })
}

/// Send a request and decode its JSON body, failing on any non-success status
pub fn read_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, MigrationError> {
    let response = expect_success(request.send()?)?;
    let url = response.url().to_string();
    let text = response.text()?;
    serde_json::from_str(&text).map_err(|e| MigrationError::decode(url, e))
}

/// Send a read request and stream its body into `path`
pub fn download_to(request: RequestBuilder, path: &Path) -> Result<u64, MigrationError> {
    let mut response = expect_success(request.send()?)?;
    let mut file = File::create(path)?;
    let written = response.copy_to(&mut file)?;
    tracing::debug!(path = %path.display(), bytes = written, "attachment downloaded");
    Ok(written)
}

/// Ids come back as strings or numbers depending on the API
pub fn id_string(id: &Value) -> Option<String> {
    match id {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

/// Deserialize a string or numeric id into a `String`
pub fn deserialize_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    id_string(&value).ok_or_else(|| de::Error::custom(format!("expected an id, found {value}")))
}

/// Like [`deserialize_id`], with `null` and a missing field as `None`
pub fn deserialize_opt_id<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(id_string))
}
