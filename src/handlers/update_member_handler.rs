//! Update Member Handler
//!
//! Edits a member's contact details on behalf of an admin or the member's
//! collector.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::audit::{AuditAction, AuditLogBuilder, AuditLogService};
use crate::directory::MemberDirectory;
use crate::domain::{DomainError, OperationContext};
use crate::error::AppError;

use super::commands::{MemberChanges, UpdateMemberCommand, UpdateMemberResult};

/// Who is making the edit
#[derive(Debug, Clone, Copy)]
pub struct Editor {
    pub principal_id: Uuid,
    pub is_admin: bool,
    /// Collector record owned by the editor
    pub collector_id: Option<Uuid>,
}

impl Editor {
    /// Admins edit anyone; collectors only their own members.
    pub fn may_edit(&self, member_collector: Option<Uuid>) -> bool {
        self.is_admin || (self.collector_id.is_some() && self.collector_id == member_collector)
    }
}

/// Handler for member edits
pub struct UpdateMemberHandler {
    pool: PgPool,
    directory: MemberDirectory,
    audit: AuditLogService,
}

impl UpdateMemberHandler {
    pub fn new(pool: PgPool) -> Self {
        Self {
            directory: MemberDirectory::new(pool.clone()),
            audit: AuditLogService::new(pool.clone()),
            pool,
        }
    }

    /// Execute the update member command
    pub async fn execute(
        &self,
        command: UpdateMemberCommand,
        editor: &Editor,
        context: &OperationContext,
    ) -> Result<UpdateMemberResult, AppError> {
        let changes = command.changes.validate()?;

        let member_collector = self
            .directory
            .collector_of_member(command.member_id)
            .await?
            .ok_or_else(|| DomainError::MemberNotFound(command.member_id.to_string()))?;

        if !editor.may_edit(member_collector) {
            tracing::warn!(
                principal_id = %editor.principal_id,
                member_id = %command.member_id,
                "Member edit outside collector scope"
            );
            return Err(AppError::Forbidden(
                "Members can only be edited by their collector or an admin".to_string(),
            ));
        }

        let mut query = update_query(command.member_id, &changes);
        let row: Option<(Option<Uuid>, DateTime<Utc>)> = query
            .build_query_as()
            .fetch_optional(&self.pool)
            .await?;

        let (auth_user_id, updated_at) =
            row.ok_or_else(|| DomainError::MemberNotFound(command.member_id.to_string()))?;

        let changed_fields = changes.changed_fields();
        tracing::info!(
            member_id = %command.member_id,
            changed_fields = ?changed_fields,
            "Member updated"
        );

        self.audit
            .record(
                AuditLogBuilder::new(AuditAction::MemberUpdated)
                    .resource("Member", command.member_id)
                    .after_state(&changes)
                    .changed_fields(changed_fields.clone()),
                context,
            )
            .await;

        Ok(UpdateMemberResult {
            member_id: command.member_id,
            auth_user_id,
            changed_fields,
            updated_at,
        })
    }
}

fn update_query(member_id: Uuid, changes: &MemberChanges) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::new("UPDATE members SET updated_at = NOW()");
    for (column, value) in changes.columns() {
        query
            .push(", ")
            .push(column)
            .push(" = ")
            .push_bind(value.map(str::to_string));
    }
    query
        .push(" WHERE id = ")
        .push_bind(member_id)
        .push(" RETURNING auth_user_id, updated_at");
    query
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_query_binds_values() {
        let changes = MemberChanges {
            phone: Some("07700 900123".to_string()),
            town: Some(String::new()),
            ..Default::default()
        };

        let query = update_query(Uuid::new_v4(), &changes);

        assert_eq!(
            query.sql(),
            "UPDATE members SET updated_at = NOW(), phone = $1, town = $2 WHERE id = $3 RETURNING auth_user_id, updated_at"
        );
    }

    #[test]
    fn test_editor_scope() {
        let collector = Uuid::new_v4();
        let admin = Editor {
            principal_id: Uuid::new_v4(),
            is_admin: true,
            collector_id: None,
        };
        let own_collector = Editor {
            principal_id: Uuid::new_v4(),
            is_admin: false,
            collector_id: Some(collector),
        };
        let no_collector = Editor {
            principal_id: Uuid::new_v4(),
            is_admin: false,
            collector_id: None,
        };

        assert!(admin.may_edit(None));
        assert!(own_collector.may_edit(Some(collector)));
        assert!(!own_collector.may_edit(Some(Uuid::new_v4())));
        assert!(!own_collector.may_edit(None));
        assert!(!no_collector.may_edit(None));
    }
}
