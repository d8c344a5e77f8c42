// SPDX-License-Identifier: MIT
//! The matching-and-reconciliation sync.
//!
//! For every Float project whose name embeds a CRM project code, the
//! reconciler correlates the project's scheduling tasks with the CRM
//! tasks under its "Implementation and Training" milestone, matching by
//! exact name, and writes assignment and time fields back. Per-item
//! outcomes (duplicates, missing contacts, updates, failures) are
//! reported to the requesting channel as they happen.
//!
//! Failure isolation: an unexpected error while processing one project
//! aborts only that project; the raw error text goes to the channel and
//! the run continues with the next project.

pub mod dates;
pub mod matching;

use std::collections::HashMap;

use anyhow::Context as _;
use serde_json::json;
use tracing::{debug, warn};

use crate::chat::Notifier;
use crate::crm::records::{Contact, ProjectTask};
use crate::crm::CrmApi;
use crate::float::{Person, Project, SchedulingApi, Task, TaskQuery};

/// The short assigned-resources field caps at 255 characters org-side;
/// the long field takes the full list.
const SHORT_RESOURCES_MAX: usize = 255;

/// Per-run tallies, reported in the closing summary message.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyncReport {
    pub projects_processed: u32,
    pub tasks_updated: u32,
    pub duplicates_flagged: u32,
    pub missing_contacts: u32,
    pub project_errors: u32,
}

/// One sync invocation over the three external seams.
pub struct Reconciler<'a> {
    scheduling: &'a dyn SchedulingApi,
    crm: &'a dyn CrmApi,
    notifier: &'a dyn Notifier,
    channel: &'a str,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        scheduling: &'a dyn SchedulingApi,
        crm: &'a dyn CrmApi,
        notifier: &'a dyn Notifier,
        channel: &'a str,
    ) -> Self {
        Self {
            scheduling,
            crm,
            notifier,
            channel,
        }
    }

    /// Run a full sync. Assumes the CRM session has already been
    /// verified by the caller.
    pub async fn run(&self) -> anyhow::Result<SyncReport> {
        let mut report = SyncReport::default();

        let people = self.people_by_id().await;
        let projects = match self.scheduling.projects().await {
            Ok(p) => p,
            Err(e) => {
                warn!(err = %e, "failed to list scheduling projects — nothing to sync");
                Vec::new()
            }
        };

        for project in projects {
            let Some(code) = matching::project_code(&project.name).map(str::to_string) else {
                debug!(project = %project.name, "no project code — skipping");
                continue;
            };
            report.projects_processed += 1;

            if let Err(e) = self.sync_project(&project, &code, &people, &mut report).await {
                report.project_errors += 1;
                self.notifier
                    .post(
                        self.channel,
                        &format!("Sync of '{}' failed: {e:#}", project.name),
                    )
                    .await
                    .ok();
            }
        }

        self.notifier
            .post(
                self.channel,
                &format!(
                    "Sync complete: {} task(s) updated, {} duplicate(s) flagged, \
                     {} missing contact(s), {} project error(s).",
                    report.tasks_updated,
                    report.duplicates_flagged,
                    report.missing_contacts,
                    report.project_errors
                ),
            )
            .await
            .ok();

        Ok(report)
    }

    async fn people_by_id(&self) -> HashMap<i64, Person> {
        match self.scheduling.people().await {
            Ok(people) => people.into_iter().map(|p| (p.people_id, p)).collect(),
            Err(e) => {
                warn!(err = %e, "failed to list scheduling people — treating as empty");
                HashMap::new()
            }
        }
    }

    async fn sync_project(
        &self,
        project: &Project,
        code: &str,
        people: &HashMap<i64, Person>,
        report: &mut SyncReport,
    ) -> anyhow::Result<()> {
        let tasks = match self
            .scheduling
            .tasks(&TaskQuery {
                project_id: Some(project.project_id),
                ..Default::default()
            })
            .await
        {
            Ok(t) => t,
            Err(e) => {
                warn!(project = %project.name, err = %e, "task fetch failed — treating as empty");
                Vec::new()
            }
        };

        // Active-person filter happens before dedup, so an inactive
        // person's booking never shadows an active one's by name.
        let active: Vec<Task> = tasks
            .into_iter()
            .filter(|t| {
                t.people_id
                    .and_then(|id| people.get(&id))
                    .map(Person::is_active)
                    .unwrap_or(false)
            })
            .collect();

        let deduped = matching::dedup_by_name(active);
        for dup in &deduped.duplicates {
            report.duplicates_flagged += 1;
            self.notifier
                .post(
                    self.channel,
                    &format!(
                        "Duplicate task '{}' in '{}' — skipped, needs manual handling.",
                        dup.name, project.name
                    ),
                )
                .await
                .ok();
        }

        let Some(milestone) = self
            .crm
            .find_milestone(code)
            .await
            .context("milestone lookup")?
        else {
            // Known edge case: a project without the milestone simply
            // produces no work.
            debug!(project = %project.name, code, "no milestone — nothing to sync");
            return Ok(());
        };

        let crm_tasks = self
            .crm
            .milestone_tasks(&milestone.id)
            .await
            .context("milestone task fetch")?;

        for task in &deduped.unique {
            let Some(crm_task) = crm_tasks.iter().find(|c| c.name == task.name) else {
                continue;
            };
            // The active filter above guarantees the person resolves.
            let Some(person) = task.people_id.and_then(|id| people.get(&id)) else {
                continue;
            };

            if self
                .sync_task(project, task, crm_task, person, report)
                .await
                .context(format!("task '{}'", task.name))?
            {
                report.tasks_updated += 1;
            }
        }

        Ok(())
    }

    /// Write one matched task. Returns whether it counts as a success
    /// (field update applied and at least one assignment settled).
    async fn sync_task(
        &self,
        project: &Project,
        task: &Task,
        crm_task: &ProjectTask,
        person: &Person,
        report: &mut SyncReport,
    ) -> anyhow::Result<bool> {
        let assignees = matching::split_assignees(&person.name);
        let joined = assignees.join(", ");
        let short: String = joined.chars().take(SHORT_RESOURCES_MAX).collect();

        // Every matched task is rewritten every run — no diffing.
        self.crm
            .update_task_fields(
                &crm_task.id,
                &json!({
                    "pse__Assigned_Resources__c": short,
                    "pse__Assigned_Resources_Long__c": joined,
                    "pse__Start_Date_Time__c": dates::crm_timestamp(task.start_date),
                    "pse__End_Date_Time__c": dates::crm_timestamp(task.end_date),
                }),
            )
            .await
            .context("field update")?;

        let mut settled = 0u32;
        for assignee in &assignees {
            let Some(contact) = self
                .crm
                .find_contact(assignee)
                .await
                .context("contact lookup")?
            else {
                report.missing_contacts += 1;
                self.notifier
                    .post(
                        self.channel,
                        &format!("Contact '{assignee}' doesn't exist — skipped."),
                    )
                    .await
                    .ok();
                continue;
            };

            if self.settle_assignment(&crm_task.id, &contact).await? {
                settled += 1;
            } else {
                self.notifier
                    .post(
                        self.channel,
                        &format!(
                            "Could not assign '{}' to task '{}' in '{}'.",
                            contact.name, task.name, project.name
                        ),
                    )
                    .await
                    .ok();
            }
        }

        if settled > 0 {
            self.notifier
                .post(
                    self.channel,
                    &format!(
                        "Updated '{}' in '{}' ({} → {})",
                        task.name, project.name, joined, task.start_date
                    ),
                )
                .await
                .ok();
        }
        Ok(settled > 0)
    }

    /// Create or correct the assignment record for a task.
    ///
    /// Returns `Ok(true)` when the assignment now points at the contact
    /// (including the no-op case), `Ok(false)` when the org rejected the
    /// write — e.g. the same role is already assigned — which is
    /// reported per-assignee and does not abort the project.
    async fn settle_assignment(&self, task_id: &str, contact: &Contact) -> anyhow::Result<bool> {
        let resource_field = if contact.is_active_internal() {
            "pse__Resource__c"
        } else {
            "pse__External_Resource__c"
        };

        let existing = self
            .crm
            .task_assignments(task_id)
            .await
            .context("assignment lookup")?;

        match existing.first() {
            Some(assignment) if assignment.current_resource() == Some(contact.id.as_str()) => {
                debug!(task_id, contact = %contact.name, "assignment already correct");
                Ok(true)
            }
            Some(assignment) => {
                match self
                    .crm
                    .update_assignment(&assignment.id, &json!({ resource_field: contact.id }))
                    .await
                {
                    Ok(()) => Ok(true),
                    Err(e) => {
                        warn!(task_id, err = %e, "assignment update rejected");
                        Ok(false)
                    }
                }
            }
            None => {
                match self
                    .crm
                    .create_assignment(&json!({
                        "pse__Project_Task__c": task_id,
                        resource_field: contact.id,
                    }))
                    .await
                {
                    Ok(_) => Ok(true),
                    Err(e) => {
                        warn!(task_id, err = %e, "assignment create rejected");
                        Ok(false)
                    }
                }
            }
        }
    }
}
