// SPDX-License-Identifier: MIT
//! Project-plan export.
//!
//! Pulls CRM project tasks modified since a given date and delivers
//! them as a CSV to the requesting channel.

use chrono::NaiveDate;

use crate::chat::Notifier;
use crate::crm::records::PlanRow;
use crate::crm::CrmApi;

use super::csv_escape;

pub const PLAN_HEADER: &str = "task_id,task_name,project,assigned_resources,start,end";

/// Render the export rows.
pub fn plan_csv(rows: &[PlanRow]) -> String {
    let mut csv = String::from(PLAN_HEADER);
    csv.push('\n');
    for row in rows {
        let project = row.project.as_ref().map(|p| p.name.as_str()).unwrap_or("");
        csv.push_str(&format!(
            "{},{},{},{},{},{}\n",
            csv_escape(&row.id),
            csv_escape(&row.name),
            csv_escape(project),
            csv_escape(row.assigned_resources.as_deref().unwrap_or("")),
            row.start_date_time.as_deref().unwrap_or(""),
            row.end_date_time.as_deref().unwrap_or(""),
        ));
    }
    csv
}

/// Query, render, and upload the export. Returns the row count.
pub async fn run_plan_export(
    crm: &dyn CrmApi,
    notifier: &dyn Notifier,
    channel: &str,
    since: NaiveDate,
) -> anyhow::Result<usize> {
    let rows = crm.plan_rows_since(since).await?;
    let csv = plan_csv(&rows);
    notifier
        .upload(channel, &format!("project_plan_{since}.csv"), &csv)
        .await?;
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::records::NamedRef;

    #[test]
    fn rows_render_with_escaping() {
        let rows = vec![PlanRow {
            id: "t1".into(),
            name: "Go Live, phase 1".into(),
            project: Some(NamedRef {
                name: "Acme-12345".into(),
            }),
            assigned_resources: Some("Jane Doe".into()),
            start_date_time: Some("2026-03-03T00:00:00.000-0500".into()),
            end_date_time: None,
        }];
        let csv = plan_csv(&rows);
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some(PLAN_HEADER));
        assert_eq!(
            lines.next(),
            Some("t1,\"Go Live, phase 1\",Acme-12345,Jane Doe,2026-03-03T00:00:00.000-0500,")
        );
    }

    #[test]
    fn empty_export_is_header_only() {
        assert_eq!(plan_csv(&[]), format!("{PLAN_HEADER}\n"));
    }
}
