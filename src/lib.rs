// SPDX-License-Identifier: MIT
//! floatbot — Slack bot that reconciles Float schedules into
//! Salesforce PSA project tasks.
//!
//! Layering, top to bottom:
//! - [`dispatch`] — event-stream polling and command handling
//! - [`sync`] / [`report`] — the reconciliation algorithm and the
//!   weekly aggregation report
//! - [`float`] / [`crm`] / [`chat`] — the three external-service
//!   clients
//! - [`config`] — process-wide configuration, loaded once at startup

pub mod chat;
pub mod config;
pub mod crm;
pub mod dispatch;
pub mod float;
pub mod report;
pub mod sync;
