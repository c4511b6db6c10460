//! Caller identity.
//!
//! Sessions are issued elsewhere; this module only resolves an opaque bearer token
//! against the `user_token` table and hands the resulting [`ActorContext`] to the
//! workflow operations, which take it explicitly.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::{AppState, Error, Result, db::now_millis, metrics::AUTH_FAILED};

/// Integer rank determining what a user may do to other users' resources.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct TrustLevel(i64);

impl TrustLevel {
    pub const fn new(level: i64) -> Self {
        Self(level)
    }

    pub const fn user() -> Self {
        Self(0)
    }

    pub const fn reviewer() -> Self {
        Self(1)
    }

    pub const fn operator() -> Self {
        Self(2)
    }

    pub const fn administrator() -> Self {
        Self(3)
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

/// The authenticated caller of a workflow operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorContext {
    pub user_id: i64,
    pub trust: TrustLevel,
    /// Shown to recipients in generated notices.
    pub display_name: String,
}

impl ActorContext {
    /// Fail with an authorization error unless the actor holds at least `level`.
    pub fn require(&self, level: TrustLevel) -> Result<()> {
        if self.trust >= level {
            Ok(())
        } else {
            Err(Error::forbidden(format!(
                "trust level {} required, caller has {}",
                level.get(),
                self.trust.get()
            )))
        }
    }

    /// Owners may always act on their own resources; everyone else needs `level`.
    pub fn require_owner_or(&self, owner: i64, level: TrustLevel) -> Result<()> {
        if self.user_id == owner {
            Ok(())
        } else {
            self.require(level)
        }
    }
}

#[derive(FromRow)]
struct SessionRow {
    id: i64,
    display_name: String,
    user_permission: i64,
    ban_time: i64,
}

/// Resolve a session token to the actor it belongs to.
pub async fn resolve_session(db: &crate::Db, token: &str) -> Result<ActorContext> {
    let now = now_millis();
    let row: Option<SessionRow> = sqlx::query_as(
        r#"
        SELECT u.id, u.display_name, u.user_permission, u.ban_time
            FROM user_token t
            JOIN user u ON u.id = t.by_user_id
            WHERE t.token = ? AND t.status = 1 AND t.expire_time > ?
        "#,
    )
    .bind(token)
    .bind(now)
    .fetch_optional(db)
    .await?;

    let Some(row) = row else {
        metrics::counter!(AUTH_FAILED).increment(1);
        return Err(Error::unauthenticated("session is invalid or expired"));
    };

    if row.ban_time > now {
        return Err(Error::forbidden("account is banned"));
    }

    Ok(ActorContext {
        user_id: row.id,
        trust: TrustLevel::new(row.user_permission),
        display_name: row.display_name,
    })
}

impl FromRequestParts<AppState> for ActorContext {
    type Rejection = Error;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or_else(|| Error::unauthenticated("missing authorization header"))?
            .to_str()
            .map_err(|_| Error::unauthenticated("malformed authorization header"))?;

        let token = header
            .strip_prefix("Bearer ")
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::unauthenticated("expected a bearer token"))?;

        resolve_session(&state.db, token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ErrorKind, tests::TestDb};

    #[test]
    fn owner_bypasses_trust_requirement() {
        let actor = ActorContext {
            user_id: 7,
            trust: TrustLevel::user(),
            display_name: "alice".to_owned(),
        };
        assert!(actor.require_owner_or(7, TrustLevel::administrator()).is_ok());
        let err = actor
            .require_owner_or(8, TrustLevel::administrator())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn resolves_active_sessions_only() {
        let t = TestDb::new().await;
        let user = t.user("reviewer", TrustLevel::reviewer()).await;
        t.session(user.user_id, "good-token", now_millis() + 60_000)
            .await;
        t.session(user.user_id, "stale-token", now_millis() - 1).await;

        let actor = resolve_session(&t.db, "good-token").await.unwrap();
        assert_eq!(actor, user);

        let err = resolve_session(&t.db, "stale-token").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthenticated);
    }

    #[tokio::test]
    async fn banned_users_are_refused() {
        let t = TestDb::new().await;
        let user = t.user("banned", TrustLevel::user()).await;
        t.session(user.user_id, "token", now_millis() + 60_000).await;
        sqlx::query("UPDATE user SET ban_time = ? WHERE id = ?")
            .bind(now_millis() + 60_000)
            .bind(user.user_id)
            .execute(&t.db)
            .await
            .unwrap();

        let err = resolve_session(&t.db, "token").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }
}
