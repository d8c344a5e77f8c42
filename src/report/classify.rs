// SPDX-License-Identifier: MIT
//! Task-category classification for the weekly report.
//!
//! An ordered set of independent predicate rules over the task name and
//! its parent project's name, all case-insensitive substring checks. A
//! task may fall into several categories at once; the only ordering
//! dependency is that "remote enduser" shadows the plain "enduser"
//! rule, so a remote training row does not also count as onsite setup.

/// Per-week category tallies. Field order mirrors the CSV columns.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    pub on_vacation: u32,
    pub in_training_for_teaching: u32,
    pub in_training_for_learning: u32,
    pub onsite_go_live: u32,
    pub onsite_setup: u32,
    pub remote_training: u32,
}

impl Tally {
    /// Total across all categories. A task can land in several, so this
    /// can exceed the task count.
    pub fn total(&self) -> u32 {
        self.on_vacation
            + self.in_training_for_teaching
            + self.in_training_for_learning
            + self.onsite_go_live
            + self.onsite_setup
            + self.remote_training
    }
}

/// Classify one task into the tally.
pub fn classify(tally: &mut Tally, task_name: &str, project_name: &str) {
    let name = task_name.to_lowercase();
    let project = project_name.to_lowercase();

    if name.contains("paid time off") {
        tally.on_vacation += 1;
    }
    if name.contains("one on one") {
        if project.contains("trainer") {
            tally.in_training_for_teaching += 1;
        }
        if project.contains("trainee") {
            tally.in_training_for_learning += 1;
        }
    }
    if name.contains("remote enduser") {
        tally.remote_training += 1;
    } else if name.contains("enduser") {
        tally.onsite_setup += 1;
    }
    if name.contains("go live") {
        tally.onsite_go_live += 1;
    }
}
