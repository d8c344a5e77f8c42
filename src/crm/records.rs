// SPDX-License-Identifier: MIT
//! Typed PSA record shapes and SOQL helpers.
//!
//! Field names follow the FinancialForce PSA managed package (`pse__`
//! namespace), which is what the org being synchronized runs.

use serde::Deserialize;

/// A PSA project task under a milestone.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectTask {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "pse__Project__c", default)]
    pub project_id: Option<String>,
    #[serde(rename = "pse__Milestone__c", default)]
    pub milestone_id: Option<String>,
    #[serde(rename = "pse__Assigned_Resources__c", default)]
    pub assigned_resources: Option<String>,
    #[serde(rename = "pse__Assigned_Resources_Long__c", default)]
    pub assigned_resources_long: Option<String>,
    #[serde(rename = "pse__Start_Date_Time__c", default)]
    pub start_date_time: Option<String>,
    #[serde(rename = "pse__End_Date_Time__c", default)]
    pub end_date_time: Option<String>,
}

/// A PSA milestone grouping tasks under a project.
#[derive(Debug, Clone, Deserialize)]
pub struct Milestone {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
}

/// The record linking a project task to the resource performing it.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskAssignment {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "pse__Project_Task__c", default)]
    pub task_id: Option<String>,
    /// Internal active-employee reference.
    #[serde(rename = "pse__Resource__c", default)]
    pub resource_id: Option<String>,
    /// External-resource reference (contractors, partner staff).
    #[serde(rename = "pse__External_Resource__c", default)]
    pub external_resource_id: Option<String>,
}

impl TaskAssignment {
    /// The resource this assignment currently points at, whichever
    /// reference field is populated.
    pub fn current_resource(&self) -> Option<&str> {
        self.resource_id
            .as_deref()
            .or(self.external_resource_id.as_deref())
    }
}

/// A Salesforce contact carrying the PSA resource flags.
#[derive(Debug, Clone, Deserialize)]
pub struct Contact {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "pse__Is_Resource__c", default)]
    pub is_resource: bool,
    #[serde(rename = "pse__Is_Resource_Active__c", default)]
    pub is_resource_active: bool,
}

impl Contact {
    /// An internal, currently-active employee resource. Everything else
    /// that resolves is treated as an external resource.
    pub fn is_active_internal(&self) -> bool {
        self.is_resource && self.is_resource_active
    }
}

/// A project task row for the plan export, with the parent project name
/// pulled through the relationship.
#[derive(Debug, Clone, Deserialize)]
pub struct PlanRow {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "pse__Project__r", default)]
    pub project: Option<NamedRef>,
    #[serde(rename = "pse__Assigned_Resources__c", default)]
    pub assigned_resources: Option<String>,
    #[serde(rename = "pse__Start_Date_Time__c", default)]
    pub start_date_time: Option<String>,
    #[serde(rename = "pse__End_Date_Time__c", default)]
    pub end_date_time: Option<String>,
}

/// A related record reduced to its name.
#[derive(Debug, Clone, Deserialize)]
pub struct NamedRef {
    #[serde(rename = "Name", default)]
    pub name: String,
}

/// Escape a string literal for interpolation into a SOQL quoted value.
pub fn soql_quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}
