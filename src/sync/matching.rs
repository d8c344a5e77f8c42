// SPDX-License-Identifier: MIT
//! Name-convention matching helpers for the reconciler.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::float::Task;

/// Matches the numeric CRM project code embedded after a hyphen in a
/// scheduling project name, e.g. `"Acme Rollout-12345"` → `12345`.
static PROJECT_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-\s*(\d+)\s*$").expect("project code regex"));

/// Extract the CRM project code from a scheduling project name.
///
/// A project with no extractable code is not a sync candidate and must
/// cause no CRM traffic at all.
pub fn project_code(name: &str) -> Option<&str> {
    PROJECT_CODE
        .captures(name)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Result of first-seen-wins deduplication by task name.
pub struct Deduped {
    /// One task per name, in fetch order.
    pub unique: Vec<Task>,
    /// Later occurrences of already-seen names; reported, never synced.
    pub duplicates: Vec<Task>,
}

/// Split tasks into the authoritative first occurrence per name and the
/// duplicates that require manual handling.
pub fn dedup_by_name(tasks: Vec<Task>) -> Deduped {
    let mut seen = std::collections::HashSet::new();
    let mut unique = Vec::new();
    let mut duplicates = Vec::new();
    for task in tasks {
        if seen.insert(task.name.clone()) {
            unique.push(task);
        } else {
            duplicates.push(task);
        }
    }
    Deduped { unique, duplicates }
}

/// Split a resolved person name into individual assignee names.
///
/// One schedule row may stand for several people, comma-separated.
pub fn split_assignees(name: &str) -> Vec<String> {
    name.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
