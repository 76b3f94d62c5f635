//! Member directory
//!
//! Paginated search over the members table for collectors and admins.
//! Collectors only ever see their own members.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::domain::DomainError;

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

/// Columns the directory may be sorted by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    CreatedAt,
    FullName,
    MemberNumber,
    Email,
    Status,
    UpdatedAt,
}

impl SortField {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        match raw {
            "created_at" => Ok(Self::CreatedAt),
            "full_name" => Ok(Self::FullName),
            "member_number" => Ok(Self::MemberNumber),
            "email" => Ok(Self::Email),
            "status" => Ok(Self::Status),
            "updated_at" => Ok(Self::UpdatedAt),
            other => Err(DomainError::InvalidSortField(other.to_string())),
        }
    }

    fn column(&self) -> &'static str {
        match self {
            Self::CreatedAt => "m.created_at",
            Self::FullName => "m.full_name",
            Self::MemberNumber => "m.member_number",
            Self::Email => "m.email",
            Self::Status => "m.status",
            Self::UpdatedAt => "m.updated_at",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    fn keyword(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Which collector's members to list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorFilter {
    All,
    Collector(Uuid),
}

impl CollectorFilter {
    /// `all` or a collector id
    pub fn parse(raw: &str) -> Option<Self> {
        if raw == "all" {
            Some(Self::All)
        } else {
            Uuid::parse_str(raw).ok().map(Self::Collector)
        }
    }
}

/// Filter a caller may actually use. Admins get what they ask for;
/// everyone else is pinned to their own collector and needs one.
pub fn scope_for(
    is_admin: bool,
    own_collector: Option<Uuid>,
    requested: CollectorFilter,
) -> Result<CollectorFilter, DomainError> {
    if is_admin {
        return Ok(requested);
    }
    own_collector
        .map(CollectorFilter::Collector)
        .ok_or(DomainError::CollectorRequired)
}

#[derive(Debug, Clone)]
pub struct MemberSearch {
    pub term: Option<String>,
    pub collector: CollectorFilter,
    pub sort: SortField,
    pub direction: SortDirection,
    /// 1-based
    pub page: u32,
    pub per_page: u32,
}

impl MemberSearch {
    pub fn new(collector: CollectorFilter) -> Self {
        Self {
            term: None,
            collector,
            sort: SortField::default(),
            direction: SortDirection::default(),
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }

    pub fn with_term(mut self, term: &str) -> Self {
        let term = term.trim();
        self.term = (!term.is_empty()).then(|| term.to_string());
        self
    }

    pub fn with_sort(mut self, sort: SortField, direction: SortDirection) -> Self {
        self.sort = sort;
        self.direction = direction;
        self
    }

    pub fn with_page(mut self, page: u32, per_page: u32) -> Self {
        self.page = page.max(1);
        self.per_page = per_page.clamp(1, MAX_PER_PAGE);
        self
    }

    fn limit(&self) -> i64 {
        i64::from(self.per_page)
    }

    fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.per_page)
    }

    /// `ILIKE` pattern for the search term with wildcards escaped
    fn pattern(&self) -> Option<String> {
        self.term.as_ref().map(|term| {
            let escaped = term
                .replace('\\', "\\\\")
                .replace('%', "\\%")
                .replace('_', "\\_");
            format!("%{}%", escaped)
        })
    }

    fn push_filters(&self, query: &mut QueryBuilder<'_, Postgres>) {
        query.push(" WHERE TRUE");
        if let CollectorFilter::Collector(collector_id) = self.collector {
            query.push(" AND m.collector_id = ").push_bind(collector_id);
        }
        if let Some(pattern) = self.pattern() {
            query.push(" AND (");
            let mut columns = query.separated(" OR ");
            for column in ["m.full_name", "m.email", "m.member_number", "m.phone"] {
                columns.push(column);
                columns.push_unseparated(" ILIKE ");
                columns.push_bind_unseparated(pattern.clone());
            }
            query.push(")");
        }
    }
}

/// One row of the directory listing
#[derive(Debug, Clone, Serialize)]
pub struct MemberListing {
    pub id: Uuid,
    pub member_number: String,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub town: Option<String>,
    pub status: Option<String>,
    pub collector: Option<String>,
    pub collector_id: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemberPage {
    pub members: Vec<MemberListing>,
    pub total_count: i64,
    pub page: u32,
    pub per_page: u32,
}

/// Directory queries over `members` and `members_collectors`
#[derive(Debug, Clone)]
pub struct MemberDirectory {
    pool: PgPool,
}

impl MemberDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Collector record owned by a principal, if any
    pub async fn collector_for(&self, principal_id: Uuid) -> Result<Option<Uuid>, sqlx::Error> {
        sqlx::query_scalar("SELECT id FROM members_collectors WHERE auth_user_id = $1 AND active")
            .bind(principal_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Collector a member belongs to. Outer `None` means no such member.
    pub async fn collector_of_member(&self, member_id: Uuid) -> Result<Option<Option<Uuid>>, sqlx::Error> {
        sqlx::query_scalar("SELECT collector_id FROM members WHERE id = $1")
            .bind(member_id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn search(&self, search: &MemberSearch) -> Result<MemberPage, sqlx::Error> {
        let mut count_query = QueryBuilder::new("SELECT COUNT(*) FROM members m");
        search.push_filters(&mut count_query);
        let total_count: i64 = count_query.build_query_scalar().fetch_one(&self.pool).await?;

        let mut query = QueryBuilder::new(
            r#"
            SELECT m.id, m.member_number, m.full_name, m.email, m.phone, m.town,
                   m.status, m.collector, m.collector_id, m.updated_at
            FROM members m
            "#,
        );
        search.push_filters(&mut query);
        query
            .push(" ORDER BY ")
            .push(search.sort.column())
            .push(" ")
            .push(search.direction.keyword())
            .push(", m.id LIMIT ")
            .push_bind(search.limit())
            .push(" OFFSET ")
            .push_bind(search.offset());

        let rows: Vec<(
            Uuid, String, String, Option<String>, Option<String>, Option<String>,
            Option<String>, Option<String>, Option<Uuid>, DateTime<Utc>,
        )> = query.build_query_as().fetch_all(&self.pool).await?;

        let members = rows
            .into_iter()
            .map(|(
                id, member_number, full_name, email, phone, town,
                status, collector, collector_id, updated_at,
            )| MemberListing {
                id,
                member_number,
                full_name,
                email,
                phone,
                town,
                status,
                collector,
                collector_id,
                updated_at,
            })
            .collect();

        tracing::debug!(
            total_count = total_count,
            page = search.page,
            "Member directory search"
        );

        Ok(MemberPage {
            members,
            total_count,
            page: search.page,
            per_page: search.per_page,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_field_whitelist() {
        assert_eq!(SortField::parse("full_name").unwrap(), SortField::FullName);
        assert_eq!(SortField::parse("member_number").unwrap().column(), "m.member_number");
        assert_eq!(
            SortField::parse("password; DROP TABLE members").unwrap_err(),
            DomainError::InvalidSortField("password; DROP TABLE members".to_string())
        );
    }

    #[test]
    fn test_collector_filter_parse() {
        let id = Uuid::new_v4();
        assert_eq!(CollectorFilter::parse("all"), Some(CollectorFilter::All));
        assert_eq!(CollectorFilter::parse(&id.to_string()), Some(CollectorFilter::Collector(id)));
        assert_eq!(CollectorFilter::parse("nobody"), None);
    }

    #[test]
    fn test_scope_admin_keeps_request() {
        let id = Uuid::new_v4();
        assert_eq!(scope_for(true, None, CollectorFilter::All).unwrap(), CollectorFilter::All);
        assert_eq!(
            scope_for(true, None, CollectorFilter::Collector(id)).unwrap(),
            CollectorFilter::Collector(id)
        );
    }

    #[test]
    fn test_scope_collector_is_pinned() {
        let own = Uuid::new_v4();
        assert_eq!(
            scope_for(false, Some(own), CollectorFilter::All).unwrap(),
            CollectorFilter::Collector(own)
        );
        assert_eq!(
            scope_for(false, Some(own), CollectorFilter::Collector(Uuid::new_v4())).unwrap(),
            CollectorFilter::Collector(own)
        );
        assert_eq!(
            scope_for(false, None, CollectorFilter::All).unwrap_err(),
            DomainError::CollectorRequired
        );
    }

    #[test]
    fn test_paging() {
        let search = MemberSearch::new(CollectorFilter::All).with_page(3, 25);
        assert_eq!(search.limit(), 25);
        assert_eq!(search.offset(), 50);

        let clamped = MemberSearch::new(CollectorFilter::All).with_page(0, 10_000);
        assert_eq!(clamped.page, 1);
        assert_eq!(clamped.per_page, MAX_PER_PAGE);
        assert_eq!(clamped.offset(), 0);
    }

    #[test]
    fn test_search_pattern_escapes_wildcards() {
        let search = MemberSearch::new(CollectorFilter::All).with_term("  50%_off ");
        assert_eq!(search.pattern().unwrap(), "%50\\%\\_off%");
        assert!(MemberSearch::new(CollectorFilter::All).with_term("   ").pattern().is_none());
    }

    #[test]
    fn test_filters_sql() {
        let collector = Uuid::new_v4();
        let search = MemberSearch::new(CollectorFilter::Collector(collector)).with_term("khan");
        let mut query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM members m");
        search.push_filters(&mut query);

        assert_eq!(
            query.sql(),
            "SELECT COUNT(*) FROM members m WHERE TRUE AND m.collector_id = $1 AND (\
             m.full_name ILIKE $2 OR m.email ILIKE $3 OR m.member_number ILIKE $4 OR m.phone ILIKE $5)"
        );
    }
}
