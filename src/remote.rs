//! Redmine REST backend.

use chrono::{DateTime, NaiveDate, Utc};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::models::{
    Assignee, Assignment, BulkRecord, Issue, IssueFilter, StatusFilter, UpdatePayload,
};
use crate::store::IssueStore;

pub const DEFAULT_PAGE_SIZE: u32 = 100;
const API_KEY_HEADER: &str = "X-Redmine-API-Key";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Issue store backed by a Redmine server.
pub struct RedmineStore {
    pub base_url: String,
    api_key: Option<String>,
    page_size: u32,
    client: Client,
}

impl fmt::Debug for RedmineStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedmineStore")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("page_size", &self.page_size)
            .finish()
    }
}

#[derive(Deserialize)]
struct IssuePage {
    issues: Vec<RemoteIssue>,
    #[serde(default)]
    total_count: Option<usize>,
}

#[derive(Deserialize)]
struct IssueEnvelope {
    issue: RemoteIssue,
}

#[derive(Deserialize)]
struct NamedRef {
    id: i64,
    #[serde(default)]
    name: String,
}

#[derive(Deserialize)]
struct CustomFieldValue {
    name: String,
    #[serde(default)]
    value: Value,
}

#[derive(Deserialize)]
struct RemoteIssue {
    id: i64,
    project: NamedRef,
    tracker: NamedRef,
    status: NamedRef,
    priority: NamedRef,
    assigned_to: Option<NamedRef>,
    subject: String,
    description: Option<String>,
    start_date: Option<NaiveDate>,
    due_date: Option<NaiveDate>,
    created_on: DateTime<Utc>,
    updated_on: DateTime<Utc>,
    closed_on: Option<DateTime<Utc>>,
    #[serde(default)]
    custom_fields: Vec<CustomFieldValue>,
}

impl From<RemoteIssue> for Issue {
    fn from(remote: RemoteIssue) -> Self {
        let custom_fields = remote
            .custom_fields
            .into_iter()
            .filter_map(|field| {
                let value = match field.value {
                    Value::Null => return None,
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                Some((field.name, value))
            })
            .collect::<BTreeMap<_, _>>();

        Issue {
            id: remote.id,
            project_id: remote.project.id,
            tracker_id: remote.tracker.id,
            subject: remote.subject,
            description: remote.description.filter(|d| !d.is_empty()),
            status_id: remote.status.id,
            status: remote.status.name,
            priority_id: remote.priority.id,
            priority: remote.priority.name,
            assignee: remote.assigned_to.map(|user| Assignee {
                id: user.id,
                name: user.name,
            }),
            created_at: remote.created_on,
            updated_at: remote.updated_on,
            closed_at: remote.closed_on,
            start_date: remote.start_date,
            due_date: remote.due_date,
            custom_fields,
        }
    }
}

impl RedmineStore {
    /// # Arguments
    /// * `base_url` - Server URL (e.g., "https://redmine.example.com")
    /// * `api_key` - Optional key sent with every request
    pub fn new(base_url: &str, api_key: Option<&str>) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()).map(String::from),
            page_size: DEFAULT_PAGE_SIZE,
            client,
        })
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.client.request(method, &url);

        if let Some(ref key) = self.api_key {
            req = req.header(API_KEY_HEADER, key);
        }

        req
    }

    /// Send and classify the response. `issue_id` turns a 404 into `NotFound` for that issue.
    fn execute(&self, req: RequestBuilder, issue_id: Option<i64>) -> Result<Response, StoreError> {
        let response = req.send()?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().unwrap_or_default();
        let err = classify_failure(status, &body, issue_id);
        if !err.is_record_level() {
            warn!(status = status.as_u16(), "tracker request failed");
        }
        Err(err)
    }

    fn fetch_page(&self, filter: &IssueFilter, offset: usize) -> Result<IssuePage, StoreError> {
        let status = match filter.status {
            StatusFilter::Open => "open",
            StatusFilter::Closed => "closed",
            StatusFilter::All => "*",
        };
        let mut query = vec![
            ("status_id", status.to_string()),
            ("offset", offset.to_string()),
            ("limit", self.page_size.to_string()),
        ];
        if let Some(project_id) = filter.project_id {
            query.push(("project_id", project_id.to_string()));
        }

        let req = self.request(Method::GET, "/issues.json").query(&query);
        let response = self.execute(req, None)?;
        decode(response)
    }
}

impl IssueStore for RedmineStore {
    fn fetch(&self, filter: &IssueFilter) -> Result<Vec<Issue>, StoreError> {
        let mut issues = Vec::new();
        loop {
            let page = self.fetch_page(filter, issues.len())?;
            let received = page.issues.len();
            issues.extend(page.issues.into_iter().map(Issue::from));
            debug!(received, total = ?page.total_count, "fetched issue page");

            let done = match page.total_count {
                Some(total) => issues.len() >= total,
                None => received < self.page_size as usize,
            };
            if received == 0 || done {
                break;
            }
        }

        issues.retain(|issue| filter.status.matches(issue));
        Ok(issues)
    }

    fn create(&self, record: &BulkRecord) -> Result<Issue, StoreError> {
        let issue = serde_json::to_value(record).map_err(|e| StoreError::Decode(e.to_string()))?;
        let req = self
            .request(Method::POST, "/issues.json")
            .json(&json!({ "issue": issue }));
        let response = self.execute(req, None)?;
        let envelope: IssueEnvelope = decode(response)?;
        Ok(envelope.issue.into())
    }

    fn update(&self, id: i64, payload: &UpdatePayload) -> Result<(), StoreError> {
        let req = self
            .request(Method::PUT, &format!("/issues/{}.json", id))
            .json(&json!({ "issue": update_body(payload) }));
        self.execute(req, Some(id))?;
        Ok(())
    }

    fn delete(&self, id: i64) -> Result<(), StoreError> {
        let req = self.request(Method::DELETE, &format!("/issues/{}.json", id));
        self.execute(req, Some(id))?;
        Ok(())
    }
}

fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, StoreError> {
    let body = response.text()?;
    serde_json::from_str(&body).map_err(|e| StoreError::Decode(e.to_string()))
}

/// Only toggled fields are sent. Unassigning sends an empty assignee.
fn update_body(payload: &UpdatePayload) -> Map<String, Value> {
    let mut body = Map::new();
    if let Some(tracker_id) = payload.tracker_id {
        body.insert("tracker_id".into(), tracker_id.into());
    }
    if let Some(status_id) = payload.status_id {
        body.insert("status_id".into(), status_id.into());
    }
    if let Some(priority_id) = payload.priority_id {
        body.insert("priority_id".into(), priority_id.into());
    }
    match payload.assignee {
        Some(Assignment::User(user_id)) => {
            body.insert("assigned_to_id".into(), user_id.into());
        }
        Some(Assignment::Unassign) => {
            body.insert("assigned_to_id".into(), Value::String(String::new()));
        }
        None => {}
    }
    if let Some(start) = payload.start_date {
        body.insert("start_date".into(), start.format("%Y-%m-%d").to_string().into());
    }
    if let Some(due) = payload.due_date {
        body.insert("due_date".into(), due.format("%Y-%m-%d").to_string().into());
    }
    if let Some(ref notes) = payload.notes {
        body.insert("notes".into(), notes.clone().into());
    }
    body
}

fn classify_failure(status: StatusCode, body: &str, issue_id: Option<i64>) -> StoreError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::Unauthorized {
            status: status.as_u16(),
        },
        StatusCode::NOT_FOUND => match issue_id {
            Some(id) => StoreError::NotFound { id },
            None => StoreError::rejected("Not found (HTTP 404)"),
        },
        _ => {
            let messages = serde_json::from_str::<Value>(body)
                .ok()
                .and_then(|v| v.get("errors").cloned())
                .and_then(|errors| match errors {
                    Value::Array(items) => Some(
                        items
                            .iter()
                            .filter_map(Value::as_str)
                            .collect::<Vec<_>>()
                            .join("; "),
                    ),
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .filter(|m| !m.is_empty());
            StoreError::rejected(
                messages.unwrap_or_else(|| format!("Tracker returned HTTP {}", status.as_u16())),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn remote_issue(id: i64, status: &str) -> Value {
        json!({
            "id": id,
            "project": {"id": 1, "name": "Core"},
            "tracker": {"id": 1, "name": "Bug"},
            "status": {"id": if status == "Closed" { 5 } else { 1 }, "name": status},
            "priority": {"id": 2, "name": "Normal"},
            "subject": format!("Issue {}", id),
            "description": "",
            "start_date": "2024-05-01",
            "due_date": null,
            "created_on": "2024-05-01T09:00:00Z",
            "updated_on": "2024-05-02T09:00:00Z",
            "closed_on": null,
            "custom_fields": [{"id": 3, "name": "Severity", "value": "major"}]
        })
    }

    /// Blocking clients must not be built or dropped on the async runtime.
    async fn blocking<T, F>(f: F) -> T
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        tokio::task::spawn_blocking(f).await.unwrap()
    }

    // ==================== Unit Tests ====================

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let store = RedmineStore::new("http://localhost:3000/", None).unwrap();
        assert_eq!(store.base_url, "http://localhost:3000");
    }

    #[test]
    fn test_debug_hides_api_key() {
        let store = RedmineStore::new("http://localhost:3000", Some("s3cret")).unwrap();
        let debug = format!("{:?}", store);
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("redacted"));
    }

    #[test]
    fn test_update_body_only_toggled_fields() {
        let payload = UpdatePayload::default().with_status(5).unassign();
        let body = update_body(&payload);
        assert_eq!(body.len(), 2);
        assert_eq!(body["status_id"], 5);
        assert_eq!(body["assigned_to_id"], "");
    }

    #[test]
    fn test_classify_failure() {
        let err = classify_failure(StatusCode::UNAUTHORIZED, "", Some(1));
        assert!(matches!(err, StoreError::Unauthorized { status: 401 }));

        let err = classify_failure(StatusCode::NOT_FOUND, "", Some(7));
        assert!(matches!(err, StoreError::NotFound { id: 7 }));

        let body = r#"{"errors": ["Subject cannot be blank", "Tracker is not included in the list"]}"#;
        let err = classify_failure(StatusCode::UNPROCESSABLE_ENTITY, body, None);
        assert!(err.is_record_level());
        assert_eq!(
            err.to_string(),
            "Subject cannot be blank; Tracker is not included in the list"
        );

        let err = classify_failure(StatusCode::INTERNAL_SERVER_ERROR, "<html>", None);
        assert_eq!(err.to_string(), "Tracker returned HTTP 500");
    }

    // ==================== HTTP Tests ====================

    #[tokio::test(flavor = "multi_thread")]
    async fn test_fetch_follows_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/issues.json"))
            .and(query_param("offset", "0"))
            .and(query_param("project_id", "1"))
            .and(header(API_KEY_HEADER, "key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issues": [remote_issue(1, "New"), remote_issue(2, "Closed")],
                "total_count": 3, "offset": 0, "limit": 2
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/issues.json"))
            .and(query_param("offset", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issues": [remote_issue(3, "New")],
                "total_count": 3, "offset": 2, "limit": 2
            })))
            .mount(&server)
            .await;

        let uri = server.uri();
        let issues = blocking(move || {
            let store = RedmineStore::new(&uri, Some("key")).unwrap().with_page_size(2);
            store.fetch(&IssueFilter::project(1)).unwrap()
        })
        .await;

        assert_eq!(issues.iter().map(|i| i.id).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(issues[1].is_closed());
        assert_eq!(issues[0].description, None);
        assert_eq!(issues[0].start_date, NaiveDate::from_ymd_opt(2024, 5, 1));
        assert_eq!(issues[0].custom_fields["Severity"], "major");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_fetch_without_total_pages_until_short_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/issues.json"))
            .and(query_param("offset", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issues": [remote_issue(1, "New"), remote_issue(2, "New")]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/issues.json"))
            .and(query_param("offset", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issues": [remote_issue(3, "Closed")]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let uri = server.uri();
        let issues = blocking(move || {
            let store = RedmineStore::new(&uri, None).unwrap().with_page_size(2);
            store.fetch(&IssueFilter::project(1)).unwrap()
        })
        .await;

        assert_eq!(issues.iter().map(|i| i.id).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(issues[2].is_closed());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_create_validation_error_is_record_level() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/issues.json"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "errors": ["Subject cannot be blank"]
            })))
            .mount(&server)
            .await;

        let uri = server.uri();
        let err = blocking(move || {
            let store = RedmineStore::new(&uri, None).unwrap();
            store.create(&BulkRecord::new("", 1)).unwrap_err()
        })
        .await;

        assert!(err.is_record_level());
        assert_eq!(err.to_string(), "Subject cannot be blank");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_create_sends_record_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/issues.json"))
            .and(body_json(json!({"issue": {
                "subject": "Crash on save",
                "description": "",
                "tracker_id": 1,
                "status_id": 1,
                "priority_id": 4,
                "project_id": 1,
                "due_date": "2024-06-01"
            }})))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({"issue": remote_issue(12, "New")})),
            )
            .mount(&server)
            .await;

        let uri = server.uri();
        let issue = blocking(move || {
            let store = RedmineStore::new(&uri, None).unwrap();
            let mut record = BulkRecord::new("Crash on save", 1);
            record.priority_id = 4;
            record.extra.insert("due_date".into(), "2024-06-01".into());
            store.create(&record).unwrap()
        })
        .await;

        assert_eq!(issue.id, 12);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_unassign_and_missing() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/issues/4.json"))
            .and(body_json(json!({"issue": {"assigned_to_id": ""}})))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/issues/5.json"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let uri = server.uri();
        let (ok, missing) = blocking(move || {
            let store = RedmineStore::new(&uri, None).unwrap();
            let payload = UpdatePayload::default().unassign();
            (store.update(4, &payload), store.update(5, &payload))
        })
        .await;

        assert!(ok.is_ok());
        assert!(matches!(missing, Err(StoreError::NotFound { id: 5 })));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_bad_credentials_abort_bulk_edit() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let uri = server.uri();
        let err = blocking(move || {
            let store = RedmineStore::new(&uri, Some("stale")).unwrap();
            let payload = UpdatePayload::default().with_priority(3);
            crate::bulk::run_bulk_edit(&store, &[1, 2, 3], &payload).unwrap_err()
        })
        .await;

        match err {
            crate::error::BulkError::Aborted {
                processed,
                remaining,
                source,
                ..
            } => {
                assert_eq!(processed, 0);
                assert_eq!(remaining, vec![1, 2, 3]);
                assert!(matches!(source, StoreError::Unauthorized { status: 401 }));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_missing_issue() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/issues/9.json"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let uri = server.uri();
        let result = blocking(move || RedmineStore::new(&uri, None).unwrap().delete(9)).await;
        assert!(matches!(result, Err(StoreError::NotFound { id: 9 })));
    }
}
