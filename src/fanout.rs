//! Per-recipient fan-out of notices, popups, cloud actions and email.
//!
//! A send to an audience becomes one row per recipient, written in batches of
//! `fanout.batch_size`. Each batch is its own transaction holding a single bulk
//! insert: a failure on batch N leaves batches `1..N` committed and surfaces as a
//! [`PartialDelivery`] naming the recipients that were not reached. Retrying a
//! send is safe; it only produces duplicate rows.

use std::ops::Range;

use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    Error, Result,
    auth::ActorContext,
    config::PolicyConfig,
    db::{
        Db, now_millis,
        util::{IDS_PER_STATEMENT, MAX_BIND_PARAMS, retry_sqlite},
    },
    mailer::Mailer,
    metrics::{EMAIL_FAILED, EMAIL_SENT, FANOUT_BATCH_FAILURES, FANOUT_ROWS},
    notices::NO_ACTIONS,
};

/// Reserved user id that, alone in a recipient list, means every user.
pub const ALL_USERS: i64 = -1;

/// Who a send is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    All,
    Users(Vec<i64>),
}

impl Audience {
    pub fn from_ids(ids: Vec<i64>) -> Self {
        if ids == [ALL_USERS] {
            Self::All
        } else {
            Self::Users(ids)
        }
    }
}

/// Expand an audience into concrete recipient ids. Literal lists are used as given.
pub async fn resolve_audience(db: &Db, audience: &Audience) -> Result<Vec<i64>> {
    match audience {
        Audience::All => {
            let ids = sqlx::query_scalar("SELECT id FROM user ORDER BY id")
                .fetch_all(db)
                .await?;
            Ok(ids)
        }
        Audience::Users(ids) => Ok(ids.clone()),
    }
}

/// What each recipient receives.
#[derive(Debug, Clone)]
pub enum Payload {
    Notice {
        title: String,
        content: String,
        detail: String,
        actions: String,
    },
    Popup {
        img_url: String,
        actions: String,
        surplus_count: i64,
    },
    CloudAction {
        actions: String,
        surplus_count: i64,
    },
}

impl Payload {
    /// Parameters bound per recipient row.
    const fn columns(&self) -> usize {
        match self {
            Self::Notice { .. } => 7,
            Self::Popup { .. } => 5,
            Self::CloudAction { .. } => 3,
        }
    }

    /// Largest batch whose bulk insert stays under SQLite's bind limit.
    fn max_batch(&self) -> usize {
        MAX_BIND_PARAMS / self.columns()
    }

    /// One bulk insert covering `recipients`.
    fn insert_batch<'a>(&'a self, sender: i64, recipients: &'a [i64]) -> QueryBuilder<'a, Sqlite> {
        match self {
            Self::Notice {
                title,
                content,
                detail,
                actions,
            } => {
                let now = now_millis();
                let mut qb = QueryBuilder::new(
                    "INSERT INTO notice (by_user_id, sender_user_id, title, content, detail, actions, time) ",
                );
                let _ = qb.push_values(recipients, |mut row, &recipient| {
                    let _ = row
                        .push_bind(recipient)
                        .push_bind(sender)
                        .push_bind(title.as_str())
                        .push_bind(content.as_str())
                        .push_bind(detail.as_str())
                        .push_bind(actions.as_str())
                        .push_bind(now);
                });
                qb
            }
            Self::Popup {
                img_url,
                actions,
                surplus_count,
            } => {
                let mut qb = QueryBuilder::new(
                    "INSERT INTO popup (by_user_id, sender_user_id, img_url, actions, surplus_count) ",
                );
                let _ = qb.push_values(recipients, |mut row, &recipient| {
                    let _ = row
                        .push_bind(recipient)
                        .push_bind(sender)
                        .push_bind(img_url.as_str())
                        .push_bind(actions.as_str())
                        .push_bind(*surplus_count);
                });
                qb
            }
            Self::CloudAction {
                actions,
                surplus_count,
            } => {
                let mut qb =
                    QueryBuilder::new("INSERT INTO user_action (by_user_id, actions, surplus_count) ");
                let _ = qb.push_values(recipients, |mut row, &recipient| {
                    let _ = row
                        .push_bind(recipient)
                        .push_bind(actions.as_str())
                        .push_bind(*surplus_count);
                });
                qb
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FanOutSummary {
    pub recipients: usize,
    pub batches: usize,
}

/// A fan-out that stopped part way. Rows for `0..failed.start` are committed.
#[derive(Debug, Error)]
#[error("delivery stopped at batch {batch}: recipients {failed:?} failed, {delivered} of {total} delivered")]
pub struct PartialDelivery {
    pub delivered: usize,
    pub total: usize,
    /// One-based index of the failed batch.
    pub batch: usize,
    /// Indexes into the recipient list of the batch that was rolled back.
    pub failed: Range<usize>,
    #[source]
    pub source: sqlx::Error,
}

async fn deliver_batch(
    db: &Db,
    payload: &Payload,
    sender: i64,
    recipients: &[i64],
) -> std::result::Result<(), sqlx::Error> {
    let mut tx = retry_sqlite(|| db.begin()).await?;
    let _ = payload
        .insert_batch(sender, recipients)
        .build()
        .execute(&mut *tx)
        .await?;
    tx.commit().await
}

/// Write one `payload` row per recipient, `batch_size` rows per transaction.
pub async fn fan_out(
    db: &Db,
    payload: &Payload,
    sender: i64,
    recipients: &[i64],
    batch_size: usize,
) -> std::result::Result<FanOutSummary, PartialDelivery> {
    let batch_size = batch_size.clamp(1, payload.max_batch());
    let mut delivered = 0;
    let mut batches = 0;

    for (index, batch) in recipients.chunks(batch_size).enumerate() {
        if let Err(source) = deliver_batch(db, payload, sender, batch).await {
            metrics::counter!(FANOUT_BATCH_FAILURES).increment(1);
            let start = index * batch_size;
            return Err(PartialDelivery {
                delivered,
                total: recipients.len(),
                batch: index + 1,
                failed: start..start + batch.len(),
                source,
            });
        }
        delivered += batch.len();
        batches += 1;
        metrics::counter!(FANOUT_ROWS).increment(batch.len() as u64);
    }

    Ok(FanOutSummary {
        recipients: delivered,
        batches,
    })
}

async fn recipients_for(db: &Db, user_ids: Vec<i64>) -> Result<(Audience, Vec<i64>)> {
    let audience = Audience::from_ids(user_ids);
    let recipients = resolve_audience(db, &audience).await?;
    if recipients.is_empty() {
        return Err(Error::validation("no recipients"));
    }
    Ok((audience, recipients))
}

/// Encode client action directives, treating an absent value as no actions.
fn encode_actions(actions: Option<&serde_json::Value>) -> String {
    match actions {
        None | Some(serde_json::Value::Null) => NO_ACTIONS.to_owned(),
        Some(value) => value.to_string(),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NoticeRequest {
    pub user_ids: Vec<i64>,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub actions: Option<serde_json::Value>,
}

/// Mass notice from an operator.
pub async fn send_notice(
    db: &Db,
    policy: &PolicyConfig,
    batch_size: usize,
    actor: &ActorContext,
    req: &NoticeRequest,
) -> Result<FanOutSummary> {
    actor.require(policy.operate)?;
    if req.title.trim().is_empty() || req.content.trim().is_empty() {
        return Err(Error::validation("a notice needs a title and content"));
    }
    let (audience, recipients) = recipients_for(db, req.user_ids.clone()).await?;

    let detail = match audience {
        Audience::All => "site-wide notice",
        Audience::Users(_) => "operator notice",
    };
    let payload = Payload::Notice {
        title: req.title.clone(),
        content: req.content.clone(),
        detail: detail.to_owned(),
        actions: encode_actions(req.actions.as_ref()),
    };
    let summary = fan_out(db, &payload, actor.user_id, &recipients, batch_size).await?;
    info!(sender = actor.user_id, recipients = summary.recipients, "sent notice");
    Ok(summary)
}

#[derive(Debug, Clone, Deserialize)]
pub struct PopupRequest {
    pub user_ids: Vec<i64>,
    /// Stored path of an image from a popup upload.
    pub img_path: String,
    #[serde(default)]
    pub actions: String,
    #[serde(default)]
    pub surplus_count: i64,
}

/// Mass interstitial popup. `surplus_count` is how many more times it is shown.
pub async fn send_popup(
    db: &Db,
    policy: &PolicyConfig,
    batch_size: usize,
    actor: &ActorContext,
    req: &PopupRequest,
) -> Result<FanOutSummary> {
    actor.require(policy.operate)?;
    if req.img_path.trim().is_empty() {
        return Err(Error::validation("a popup needs an image"));
    }
    let (_, recipients) = recipients_for(db, req.user_ids.clone()).await?;

    let payload = Payload::Popup {
        img_url: req.img_path.clone(),
        actions: req.actions.clone(),
        surplus_count: req.surplus_count,
    };
    let summary = fan_out(db, &payload, actor.user_id, &recipients, batch_size).await?;
    info!(sender = actor.user_id, recipients = summary.recipients, "sent popup");
    Ok(summary)
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionsRequest {
    pub user_ids: Vec<i64>,
    pub actions: serde_json::Value,
    pub surplus_count: i64,
}

/// Mass cloud-action directive for clients to execute.
pub async fn send_actions(
    db: &Db,
    policy: &PolicyConfig,
    batch_size: usize,
    actor: &ActorContext,
    req: &ActionsRequest,
) -> Result<FanOutSummary> {
    actor.require(policy.operate)?;
    if req.actions.is_null() {
        return Err(Error::validation("cloud actions are required"));
    }
    let (_, recipients) = recipients_for(db, req.user_ids.clone()).await?;

    let payload = Payload::CloudAction {
        actions: req.actions.to_string(),
        surplus_count: req.surplus_count,
    };
    let summary = fan_out(db, &payload, actor.user_id, &recipients, batch_size).await?;
    info!(sender = actor.user_id, recipients = summary.recipients, "sent cloud actions");
    Ok(summary)
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailRequest {
    pub user_ids: Vec<i64>,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EmailSummary {
    pub sent: usize,
    pub failed: usize,
}

async fn verified_addresses(db: &Db, audience: Audience) -> Result<Vec<String>> {
    const VERIFIED: &str = "SELECT bind_email FROM user WHERE verify_email = 1 AND bind_email != ''";

    let mut ids = match audience {
        Audience::All => {
            let addresses = sqlx::query_scalar(VERIFIED).fetch_all(db).await?;
            return Ok(addresses);
        }
        Audience::Users(ids) => ids,
    };
    if ids.is_empty() {
        return Err(Error::validation("no recipients"));
    }
    ids.sort_unstable();
    ids.dedup();

    let mut addresses = Vec::new();
    for chunk in ids.chunks(IDS_PER_STATEMENT) {
        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(VERIFIED);
        let _ = qb.push(" AND id IN (");
        let mut list = qb.separated(", ");
        for &id in chunk {
            let _ = list.push_bind(id);
        }
        let _ = list.push_unseparated(")");
        addresses.extend(qb.build_query_scalar::<String>().fetch_all(db).await?);
    }
    Ok(addresses)
}

/// Email every verified address in the audience.
///
/// Deliveries are independent: failures are logged and counted, and never fail
/// the call.
pub async fn send_email(
    db: &Db,
    mailer: &dyn Mailer,
    policy: &PolicyConfig,
    actor: &ActorContext,
    req: &EmailRequest,
) -> Result<EmailSummary> {
    actor.require(policy.operate)?;
    if req.subject.trim().is_empty() || req.body.trim().is_empty() {
        return Err(Error::validation("an email needs a subject and body"));
    }

    let addresses = verified_addresses(db, Audience::from_ids(req.user_ids.clone())).await?;
    if addresses.is_empty() {
        return Err(Error::validation("no recipients with a verified email"));
    }

    let mut summary = EmailSummary { sent: 0, failed: 0 };
    for address in &addresses {
        match mailer.send(address, &req.subject, &req.body).await {
            Ok(()) => {
                summary.sent += 1;
                metrics::counter!(EMAIL_SENT).increment(1);
            }
            Err(e) => {
                summary.failed += 1;
                metrics::counter!(EMAIL_FAILED).increment(1);
                warn!("failed to send email to {address}: {e:#}");
            }
        }
    }

    info!(sender = actor.user_id, sent = summary.sent, failed = summary.failed, "sent email");
    Ok(summary)
}
