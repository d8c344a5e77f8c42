// SPDX-License-Identifier: MIT
//! Salesforce REST client.
//!
//! Session-token-authenticated calls against a configured instance URL:
//! a lightweight introspection call to establish session validity, SOQL
//! queries with `nextRecordsUrl` pagination, and create/update of
//! records by sobject type.
//!
//! Session expiry is not retried: the caller gets
//! [`CrmError::SessionExpired`] and is expected to surface it to the
//! user and abort the requested sync.

pub mod records;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

const API_VERSION: &str = "v52.0";

// ─── Error type ───────────────────────────────────────────────────────────────

/// Errors from Salesforce operations.
#[derive(Debug, thiserror::Error)]
pub enum CrmError {
    #[error("Salesforce session is expired or invalid")]
    SessionExpired,
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Salesforce returned HTTP {status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("Failed to decode Salesforce response: {0}")]
    Decode(String),
    #[error("No Salesforce instance URL configured")]
    NoInstanceUrl,
}

// ─── Query envelope ───────────────────────────────────────────────────────────

/// A SOQL query result: the decoded records plus the org-side total.
#[derive(Debug)]
pub struct QueryResult<T> {
    pub records: Vec<T>,
    pub total_size: u64,
}

#[derive(Deserialize)]
struct QueryPage<T> {
    #[serde(rename = "totalSize", default)]
    total_size: u64,
    #[serde(default = "default_done")]
    done: bool,
    #[serde(rename = "nextRecordsUrl", default)]
    next_records_url: Option<String>,
    #[serde(default = "Vec::new")]
    records: Vec<T>,
}

fn default_done() -> bool {
    true
}

#[derive(Deserialize)]
struct CreateResponse {
    id: String,
}

// ─── Client ───────────────────────────────────────────────────────────────────

/// HTTP client bound to one instance URL and one session token.
///
/// Constructed per sync invocation — the token arrives with the chat
/// command and is never persisted.
pub struct CrmClient {
    http: reqwest::Client,
    instance_url: String,
    session_token: String,
}

impl CrmClient {
    pub fn new(instance_url: &str, session_token: &str) -> Result<Self, CrmError> {
        if instance_url.is_empty() {
            return Err(CrmError::NoInstanceUrl);
        }
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            instance_url: instance_url.trim_end_matches('/').to_string(),
            session_token: session_token.to_string(),
        })
    }

    fn data_url(&self, path: &str) -> String {
        format!("{}/services/data/{API_VERSION}{path}", self.instance_url)
    }

    async fn check(&self, resp: reqwest::Response) -> Result<reqwest::Response, CrmError> {
        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(CrmError::SessionExpired);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CrmError::Api { status, body });
        }
        Ok(resp)
    }

    /// Lightweight introspection call establishing session validity.
    pub async fn verify_session(&self) -> Result<(), CrmError> {
        let resp = self
            .http
            .get(self.data_url("/sobjects"))
            .bearer_auth(&self.session_token)
            .send()
            .await?;
        self.check(resp).await?;
        Ok(())
    }

    /// Run a SOQL query, following `nextRecordsUrl` until the record set
    /// is complete.
    pub async fn query<T: DeserializeOwned>(&self, soql: &str) -> Result<QueryResult<T>, CrmError> {
        debug!(soql, "running SOQL query");
        let resp = self
            .http
            .get(self.data_url("/query"))
            .query(&[("q", soql)])
            .bearer_auth(&self.session_token)
            .send()
            .await?;
        let mut page: QueryPage<T> = self.decode(resp).await?;

        let total_size = page.total_size;
        let mut records = std::mem::take(&mut page.records);
        while !page.done {
            let next = match page.next_records_url.take() {
                Some(u) => u,
                None => break,
            };
            page = self
                .get_json(&format!("{}{}", self.instance_url, next))
                .await?;
            records.append(&mut page.records);
        }

        Ok(QueryResult {
            records,
            total_size,
        })
    }

    /// Create a record of the given sobject type. Returns the new id.
    pub async fn create(
        &self,
        sobject: &str,
        fields: &serde_json::Value,
    ) -> Result<String, CrmError> {
        let resp = self
            .http
            .post(self.data_url(&format!("/sobjects/{sobject}")))
            .bearer_auth(&self.session_token)
            .json(fields)
            .send()
            .await?;
        let resp = self.check(resp).await?;
        let created: CreateResponse = resp
            .json()
            .await
            .map_err(|e| CrmError::Decode(e.to_string()))?;
        Ok(created.id)
    }

    /// Update a record of the given sobject type by id.
    pub async fn update(
        &self,
        sobject: &str,
        id: &str,
        fields: &serde_json::Value,
    ) -> Result<(), CrmError> {
        let resp = self
            .http
            .patch(self.data_url(&format!("/sobjects/{sobject}/{id}")))
            .bearer_auth(&self.session_token)
            .json(fields)
            .send()
            .await?;
        self.check(resp).await?;
        Ok(())
    }

    /// GET a pre-encoded URL (the `nextRecordsUrl` follow-up path).
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, CrmError> {
        let resp = self
            .http
            .get(url)
            .bearer_auth(&self.session_token)
            .send()
            .await?;
        self.decode(resp).await
    }

    async fn decode<T: DeserializeOwned>(&self, resp: reqwest::Response) -> Result<T, CrmError> {
        let resp = self.check(resp).await?;
        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|e| CrmError::Decode(e.to_string()))
    }
}

// ─── Reconciler-facing API ───────────────────────────────────────────────────

/// The CRM milestone whose tasks participate in matching.
pub const MILESTONE_NAME: &str = "Implementation and Training";

/// The CRM as the reconciler and plan export see it.
///
/// Implemented by [`CrmClient`] over SOQL; integration tests substitute
/// an in-memory fake so create/update traffic can be asserted on.
#[async_trait::async_trait]
pub trait CrmApi: Send + Sync {
    async fn verify_session(&self) -> Result<(), CrmError>;
    /// Resolve the "Implementation and Training" milestone for the
    /// project whose name contains the numeric code.
    async fn find_milestone(&self, project_code: &str)
        -> Result<Option<records::Milestone>, CrmError>;
    async fn milestone_tasks(
        &self,
        milestone_id: &str,
    ) -> Result<Vec<records::ProjectTask>, CrmError>;
    /// Exact-name contact lookup.
    async fn find_contact(&self, name: &str) -> Result<Option<records::Contact>, CrmError>;
    async fn task_assignments(
        &self,
        task_id: &str,
    ) -> Result<Vec<records::TaskAssignment>, CrmError>;
    async fn update_task_fields(
        &self,
        task_id: &str,
        fields: &serde_json::Value,
    ) -> Result<(), CrmError>;
    async fn create_assignment(&self, fields: &serde_json::Value) -> Result<String, CrmError>;
    async fn update_assignment(
        &self,
        assignment_id: &str,
        fields: &serde_json::Value,
    ) -> Result<(), CrmError>;
    /// Project tasks modified on or after the given date, for the plan
    /// export.
    async fn plan_rows_since(
        &self,
        since: chrono::NaiveDate,
    ) -> Result<Vec<records::PlanRow>, CrmError>;
}

#[async_trait::async_trait]
impl CrmApi for CrmClient {
    async fn verify_session(&self) -> Result<(), CrmError> {
        CrmClient::verify_session(self).await
    }

    async fn find_milestone(
        &self,
        project_code: &str,
    ) -> Result<Option<records::Milestone>, CrmError> {
        let soql = format!(
            "SELECT Id, Name FROM pse__Milestone__c \
             WHERE Name = '{MILESTONE_NAME}' \
             AND pse__Project__r.Name LIKE '%{}%'",
            records::soql_quote(project_code)
        );
        let mut result: QueryResult<records::Milestone> = self.query(&soql).await?;
        Ok(if result.records.is_empty() {
            None
        } else {
            Some(result.records.swap_remove(0))
        })
    }

    async fn milestone_tasks(
        &self,
        milestone_id: &str,
    ) -> Result<Vec<records::ProjectTask>, CrmError> {
        let soql = format!(
            "SELECT Id, Name, pse__Project__c, pse__Milestone__c, \
             pse__Assigned_Resources__c, pse__Assigned_Resources_Long__c, \
             pse__Start_Date_Time__c, pse__End_Date_Time__c \
             FROM pse__Project_Task__c WHERE pse__Milestone__c = '{}'",
            records::soql_quote(milestone_id)
        );
        Ok(self.query(&soql).await?.records)
    }

    async fn find_contact(&self, name: &str) -> Result<Option<records::Contact>, CrmError> {
        let soql = format!(
            "SELECT Id, Name, pse__Is_Resource__c, pse__Is_Resource_Active__c \
             FROM Contact WHERE Name = '{}'",
            records::soql_quote(name)
        );
        let mut result: QueryResult<records::Contact> = self.query(&soql).await?;
        Ok(if result.records.is_empty() {
            None
        } else {
            Some(result.records.swap_remove(0))
        })
    }

    async fn task_assignments(
        &self,
        task_id: &str,
    ) -> Result<Vec<records::TaskAssignment>, CrmError> {
        let soql = format!(
            "SELECT Id, pse__Project_Task__c, pse__Resource__c, pse__External_Resource__c \
             FROM pse__Project_Task_Assignment__c WHERE pse__Project_Task__c = '{}'",
            records::soql_quote(task_id)
        );
        Ok(self.query(&soql).await?.records)
    }

    async fn update_task_fields(
        &self,
        task_id: &str,
        fields: &serde_json::Value,
    ) -> Result<(), CrmError> {
        self.update("pse__Project_Task__c", task_id, fields).await
    }

    async fn create_assignment(&self, fields: &serde_json::Value) -> Result<String, CrmError> {
        self.create("pse__Project_Task_Assignment__c", fields).await
    }

    async fn update_assignment(
        &self,
        assignment_id: &str,
        fields: &serde_json::Value,
    ) -> Result<(), CrmError> {
        self.update("pse__Project_Task_Assignment__c", assignment_id, fields)
            .await
    }

    async fn plan_rows_since(
        &self,
        since: chrono::NaiveDate,
    ) -> Result<Vec<records::PlanRow>, CrmError> {
        let soql = format!(
            "SELECT Id, Name, pse__Project__r.Name, pse__Assigned_Resources__c, \
             pse__Start_Date_Time__c, pse__End_Date_Time__c \
             FROM pse__Project_Task__c \
             WHERE LastModifiedDate >= {since}T00:00:00Z"
        );
        Ok(self.query(&soql).await?.records)
    }
}

#[cfg(test)]
mod tests {
    use super::records::Contact;
    use super::*;

    #[tokio::test]
    async fn verify_session_maps_401_to_session_expired() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/services/data/v52.0/sobjects")
            .with_status(401)
            .create_async()
            .await;

        let client = CrmClient::new(&server.url(), "stale-token").unwrap();
        assert!(matches!(
            client.verify_session().await,
            Err(CrmError::SessionExpired)
        ));
    }

    #[tokio::test]
    async fn verify_session_accepts_valid_token() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/services/data/v52.0/sobjects")
            .match_header("authorization", "Bearer good-token")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let client = CrmClient::new(&server.url(), "good-token").unwrap();
        client.verify_session().await.unwrap();
    }

    #[tokio::test]
    async fn query_follows_next_records_url() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Regex("^/services/data/v52.0/query".into()))
            .with_status(200)
            .with_body(format!(
                r#"{{"totalSize":2,"done":false,
                    "nextRecordsUrl":"/services/data/v52.0/query/01g-2000",
                    "records":[{{"Id":"c1","Name":"Jane Doe",
                      "pse__Is_Resource__c":true,"pse__Is_Resource_Active__c":true}}]}}"#
            ))
            .create_async()
            .await;
        server
            .mock("GET", "/services/data/v52.0/query/01g-2000")
            .with_status(200)
            .with_body(
                r#"{"totalSize":2,"done":true,
                    "records":[{"Id":"c2","Name":"John Roe",
                      "pse__Is_Resource__c":false,"pse__Is_Resource_Active__c":false}]}"#,
            )
            .create_async()
            .await;

        let client = CrmClient::new(&server.url(), "t").unwrap();
        let result: QueryResult<Contact> =
            client.query("SELECT Id FROM Contact").await.unwrap();
        assert_eq!(result.total_size, 2);
        assert_eq!(result.records.len(), 2);
        assert_eq!(result.records[1].name, "John Roe");
    }

    #[tokio::test]
    async fn create_returns_new_id() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock(
                "POST",
                "/services/data/v52.0/sobjects/pse__Project_Task_Assignment__c",
            )
            .with_status(201)
            .with_body(r#"{"id":"a-new","success":true,"errors":[]}"#)
            .create_async()
            .await;

        let client = CrmClient::new(&server.url(), "t").unwrap();
        let id = client
            .create(
                "pse__Project_Task_Assignment__c",
                &serde_json::json!({"pse__Project_Task__c": "t1"}),
            )
            .await
            .unwrap();
        assert_eq!(id, "a-new");
    }

    #[tokio::test]
    async fn update_surfaces_api_error_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PATCH", "/services/data/v52.0/sobjects/pse__Project_Task__c/t1")
            .with_status(400)
            .with_body(r#"[{"message":"Required fields are missing"}]"#)
            .create_async()
            .await;

        let client = CrmClient::new(&server.url(), "t").unwrap();
        match client
            .update("pse__Project_Task__c", "t1", &serde_json::json!({}))
            .await
        {
            Err(CrmError::Api { status, body }) => {
                assert_eq!(status.as_u16(), 400);
                assert!(body.contains("Required fields"));
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn soql_query_is_percent_encoded() {
        let mut server = mockito::Server::new_async().await;
        let soql = "SELECT Id FROM Contact WHERE Name = 'O''Brien'";
        let mock = server
            .mock("GET", "/services/data/v52.0/query")
            .match_query(mockito::Matcher::UrlEncoded("q".into(), soql.into()))
            .with_status(200)
            .with_body(r#"{"totalSize":0,"done":true,"records":[]}"#)
            .create_async()
            .await;

        let client = CrmClient::new(&server.url(), "t").unwrap();
        let result: QueryResult<Contact> = client.query(soql).await.unwrap();
        mock.assert_async().await;
        assert!(result.records.is_empty());
    }
}
