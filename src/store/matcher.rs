//! Profile matcher
//!
//! Links `members.auth_user_id` to a principal by member number. The member
//! row is locked for the duration so two principals cannot claim it at once.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::MemberNumber;
use crate::profile::{MatchOutcome, ProfileMatcher};

#[derive(Debug, Clone)]
pub struct PgProfileMatcher {
    pool: PgPool,
}

impl PgProfileMatcher {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn link(&self, principal_id: Uuid, member_number: &MemberNumber) -> Result<MatchOutcome, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let member: Option<(Uuid, Option<Uuid>)> = sqlx::query_as(
            r#"
            SELECT id, auth_user_id
            FROM members
            WHERE member_number = $1
            FOR UPDATE
            "#,
        )
        .bind(member_number.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match member {
            None => MatchOutcome::failed(format!("No member found with member number {}", member_number)),
            Some((_, Some(owner))) if owner == principal_id => MatchOutcome::linked(),
            Some((_, Some(_))) => MatchOutcome::failed("Member number is linked to another account"),
            Some((member_id, None)) => {
                sqlx::query("UPDATE members SET auth_user_id = $2 WHERE id = $1")
                    .bind(member_id)
                    .bind(principal_id)
                    .execute(&mut *tx)
                    .await?;

                tracing::info!(
                    principal_id = %principal_id,
                    member_id = %member_id,
                    member_number = %member_number,
                    "Linked principal to member"
                );
                MatchOutcome::linked()
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }
}

#[async_trait]
impl ProfileMatcher for PgProfileMatcher {
    async fn match_and_link(&self, principal_id: Uuid, member_number: &MemberNumber) -> MatchOutcome {
        match self.link(principal_id, member_number).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(
                    principal_id = %principal_id,
                    member_number = %member_number,
                    error = %e,
                    "Profile matcher query failed"
                );
                MatchOutcome::failed(format!("Profile matching failed: {}", e))
            }
        }
    }
}
