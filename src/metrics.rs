//! Metric name constants.

use std::time::Duration;

use anyhow::Context;
use metrics::describe_counter;
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config;

pub const AUTH_FAILED: &str = "appmarket.auth.failed"; // Counter.

pub const APP_AUDITS: &str = "appmarket.audit.apps"; // Counter.
pub const MIRROR_AUDITS: &str = "appmarket.audit.mirrors"; // Counter.
pub const APP_SUBMISSIONS: &str = "appmarket.apps.submitted"; // Counter.

pub const REPORTS_RESOLVED: &str = "appmarket.reports.resolved"; // Counter.
pub const TAKEDOWNS: &str = "appmarket.reports.takedowns"; // Counter.

pub const PAGE_SYNCS: &str = "appmarket.pages.syncs"; // Counter.

pub const FANOUT_ROWS: &str = "appmarket.fanout.rows"; // Counter.
pub const FANOUT_BATCH_FAILURES: &str = "appmarket.fanout.batch_failures"; // Counter.
pub const EMAIL_SENT: &str = "appmarket.email.sent"; // Counter.
pub const EMAIL_FAILED: &str = "appmarket.email.failed"; // Counter.

/// Must be ran exactly once on startup. This will declare all of the instruments for `metrics`.
pub fn setup(config: Option<&config::MetricConfig>) -> anyhow::Result<()> {
    describe_counter!(AUTH_FAILED, "The number of failed authentication attempts.");

    describe_counter!(APP_AUDITS, "App review decisions recorded.");
    describe_counter!(MIRROR_AUDITS, "Download mirror review decisions recorded.");
    describe_counter!(APP_SUBMISSIONS, "Apps submitted for review.");

    describe_counter!(REPORTS_RESOLVED, "Reports moved to resolved.");
    describe_counter!(
        TAKEDOWNS,
        "Apps rejected or comments hidden as a result of a report."
    );

    describe_counter!(PAGE_SYNCS, "Content page membership syncs.");

    describe_counter!(FANOUT_ROWS, "Per-recipient rows written by fan-out.");
    describe_counter!(
        FANOUT_BATCH_FAILURES,
        "Fan-out batches that failed and were rolled back."
    );
    describe_counter!(EMAIL_SENT, "Emails handed to the mail relay.");
    describe_counter!(EMAIL_FAILED, "Emails the mail relay refused or never received.");

    if let Some(config) = config {
        match config {
            config::MetricConfig::PrometheusPush(prometheus_config) => {
                PrometheusBuilder::new()
                    .with_push_gateway(
                        prometheus_config.url.clone(),
                        Duration::from_secs(10),
                        None,
                        None,
                    )
                    .context("failed to set up push gateway")?
                    .install()
                    .context("failed to install metrics exporter")?;
            }
        }
    }

    Ok(())
}
