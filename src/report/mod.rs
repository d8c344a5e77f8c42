// SPDX-License-Identifier: MIT
//! Weekly aggregation report.
//!
//! Walks the calendar weeks of a three-month window (one month before
//! the current month through one month after), tallies scheduling-task
//! categories per week, and assembles a CSV with one row per week that
//! had at least one task. Progress is posted per week; the finished CSV
//! is uploaded to the requesting channel.

pub mod classify;
pub mod plan;

use std::collections::HashMap;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use tracing::{debug, warn};

use crate::chat::Notifier;
use crate::float::{SchedulingApi, TaskQuery};

/// Fixed artifact header. The `on_vocation` spelling is part of the
/// contract consumers of the CSV already depend on.
pub const CSV_HEADER: &str = "start_date,on_vocation,in_training_for_teaching,\
in_training_for_learning,onsite_go_live,onsite_setup,remote_training";

/// Monday anchors of every ISO week touching the window
/// [first day of previous month, last day of next month] around `today`.
pub fn week_mondays(today: NaiveDate) -> Vec<NaiveDate> {
    let window_start = first_of_month(today)
        .pred_opt()
        .map(first_of_month)
        .unwrap_or(today);
    let window_end = last_of_next_month(today);

    let mut monday = window_start
        - Duration::days(window_start.weekday().num_days_from_monday() as i64);
    let mut mondays = Vec::new();
    while monday <= window_end {
        mondays.push(monday);
        monday += Duration::days(7);
    }
    mondays
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn last_of_next_month(date: NaiveDate) -> NaiveDate {
    // First of the month after next, minus one day.
    let (year, month) = match date.month() {
        11 => (date.year() + 1, 1),
        12 => (date.year() + 1, 2),
        m => (date.year(), m + 2),
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.pred_opt())
        .unwrap_or(date)
}

/// Render one CSV row for a week's tally.
fn csv_row(monday: NaiveDate, tally: &classify::Tally) -> String {
    format!(
        "{},{},{},{},{},{},{}",
        monday,
        tally.on_vacation,
        tally.in_training_for_teaching,
        tally.in_training_for_learning,
        tally.onsite_go_live,
        tally.onsite_setup,
        tally.remote_training
    )
}

/// Escape one field for CSV output (used by the plan export, where
/// names may carry commas or quotes).
pub(crate) fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Build and deliver the weekly report.
///
/// Returns the CSV contents so the one-shot CLI path and tests can
/// inspect it without Slack in the loop.
pub async fn run_weekly_report(
    scheduling: &dyn SchedulingApi,
    notifier: &dyn Notifier,
    channel: &str,
    today: NaiveDate,
) -> anyhow::Result<String> {
    // Parent project names, fetched once — category rules need them.
    let project_names: HashMap<i64, String> = match scheduling.projects().await {
        Ok(projects) => projects.into_iter().map(|p| (p.project_id, p.name)).collect(),
        Err(e) => {
            warn!(err = %e, "failed to list projects for report — classifying without project names");
            HashMap::new()
        }
    };

    let mut csv = String::from(CSV_HEADER);
    csv.push('\n');

    for monday in week_mondays(today) {
        let sunday = monday + Duration::days(6);
        let tasks = match scheduling
            .tasks(&TaskQuery {
                project_id: None,
                start_date: Some(monday),
                end_date: Some(sunday),
            })
            .await
        {
            Ok(t) => t,
            Err(e) => {
                warn!(week = %monday, err = %e, "task fetch failed — skipping week");
                continue;
            }
        };

        notifier
            .post(
                channel,
                &format!("Processed week starting {monday}: {} task(s).", tasks.len()),
            )
            .await
            .ok();

        if tasks.is_empty() {
            debug!(week = %monday, "no tasks — no row");
            continue;
        }

        let mut tally = classify::Tally::default();
        for task in &tasks {
            let project = task
                .project_id
                .and_then(|id| project_names.get(&id))
                .map(String::as_str)
                .unwrap_or("");
            classify::classify(&mut tally, &task.name, project);
        }

        csv.push_str(&csv_row(monday, &tally));
        csv.push('\n');
    }

    notifier.upload(channel, "weekly_report.csv", &csv).await?;
    Ok(csv)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn window_spans_previous_through_next_month() {
        let mondays = week_mondays(d(2026, 3, 15));
        // Window is Feb 1 .. Apr 30 2026. Feb 1 is a Sunday, so the first
        // Monday anchor is Jan 26; the last is Apr 27.
        assert_eq!(mondays.first().copied(), Some(d(2026, 1, 26)));
        assert_eq!(mondays.last().copied(), Some(d(2026, 4, 27)));
        assert!(mondays.iter().all(|m| m.weekday() == Weekday::Mon));
        // Consecutive Mondays, no gaps.
        assert!(mondays.windows(2).all(|w| w[1] - w[0] == Duration::days(7)));
    }

    #[test]
    fn window_crosses_year_boundary() {
        let mondays = week_mondays(d(2026, 1, 10));
        // Window is Dec 1 2025 .. Feb 28 2026.
        assert!(mondays.first().copied().unwrap() <= d(2025, 12, 1));
        assert!(mondays.last().copied().unwrap() >= d(2026, 2, 22));
        let dec = week_mondays(d(2025, 12, 10));
        assert!(dec.last().copied().unwrap() >= d(2026, 1, 26));
    }

    #[test]
    fn csv_row_renders_all_counts() {
        let tally = classify::Tally {
            on_vacation: 2,
            onsite_go_live: 1,
            ..Default::default()
        };
        assert_eq!(csv_row(d(2026, 3, 2), &tally), "2026-03-02,2,0,0,1,0,0");
    }

    #[test]
    fn header_spelling_is_fixed() {
        assert!(CSV_HEADER.starts_with("start_date,on_vocation,"));
        assert_eq!(CSV_HEADER.split(',').count(), 7);
    }

    #[test]
    fn escape_quotes_fields_with_commas() {
        assert_eq!(csv_escape("plain"), "plain");
        assert_eq!(csv_escape("Doe, Jane"), "\"Doe, Jane\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
