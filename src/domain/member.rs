//! Member aggregate
//!
//! The denormalized view of a member and its relations. Rows arrive from the
//! store as [`MemberRecord`] (every relation optional) and are turned into a
//! [`MemberAggregate`] whose collections are always present.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role that grants access to the admin panel and the full member directory
pub const ADMIN_ROLE: &str = "admin";

/// Identity, membership and payment fields of a member row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberProfile {
    pub id: Uuid,
    pub member_number: String,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub town: Option<String>,
    pub postcode: Option<String>,
    pub status: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub marital_status: Option<String>,
    pub collector: Option<String>,
    pub photo_url: Option<String>,
    pub membership_type: Option<String>,
    pub payment_date: Option<NaiveDate>,
    pub yearly_payment_status: Option<String>,
    pub yearly_payment_due_date: Option<NaiveDate>,
    pub yearly_payment_amount: Option<Decimal>,
    pub emergency_collection_status: Option<String>,
    pub emergency_collection_amount: Option<Decimal>,
    pub emergency_collection_due_date: Option<NaiveDate>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyMember {
    pub id: Uuid,
    pub full_name: Option<String>,
    pub relationship: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberNote {
    pub id: Uuid,
    pub note_text: Option<String>,
    pub note_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub id: Uuid,
    pub payment_type: Option<String>,
    pub payment_method: Option<String>,
    pub amount: Option<Decimal>,
    pub status: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub payment_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRole {
    pub role: String,
}

impl UserRole {
    pub fn new(role: impl Into<String>) -> Self {
        Self { role: role.into() }
    }
}

/// A member row as returned by the store, before defaults are applied.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MemberRecord {
    #[serde(flatten)]
    pub profile: MemberProfile,
    pub failed_login_attempts: Option<i32>,
    pub family_members: Option<Vec<FamilyMember>>,
    pub member_notes: Option<Vec<MemberNote>>,
    pub payment_requests: Option<Vec<PaymentRequest>>,
}

impl MemberRecord {
    pub fn new(profile: MemberProfile) -> Self {
        Self {
            profile,
            failed_login_attempts: None,
            family_members: None,
            member_notes: None,
            payment_requests: None,
        }
    }
}

/// The merged view of one member, its relations and the principal's roles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberAggregate {
    #[serde(flatten)]
    pub profile: MemberProfile,
    pub failed_login_attempts: i32,
    pub family_members: Vec<FamilyMember>,
    pub member_notes: Vec<MemberNote>,
    pub payment_requests: Vec<PaymentRequest>,
    pub user_roles: Vec<UserRole>,
    pub roles: Vec<String>,
}

impl MemberAggregate {
    /// Merge a member record with the principal's role assignments.
    ///
    /// Roles come only from `role_assignments`; nothing on the record is
    /// trusted for them.
    pub fn assemble(record: MemberRecord, role_assignments: Vec<UserRole>) -> Self {
        let roles = role_assignments.iter().map(|r| r.role.clone()).collect();

        Self {
            profile: record.profile,
            failed_login_attempts: record.failed_login_attempts.unwrap_or(0),
            family_members: record.family_members.unwrap_or_default(),
            member_notes: record.member_notes.unwrap_or_default(),
            payment_requests: record.payment_requests.unwrap_or_default(),
            user_roles: role_assignments,
            roles,
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn member_number(&self) -> &str {
        &self.profile.member_number
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_assemble_defaults_missing_relations() {
        let record = MemberRecord::new(fixtures::profile("M0001", Utc::now()));
        let aggregate = MemberAggregate::assemble(record, vec![]);

        assert_eq!(aggregate.failed_login_attempts, 0);
        assert!(aggregate.family_members.is_empty());
        assert!(aggregate.member_notes.is_empty());
        assert!(aggregate.payment_requests.is_empty());
        assert!(aggregate.roles.is_empty());
    }

    #[test]
    fn test_assemble_flattens_roles() {
        let record = MemberRecord::new(fixtures::profile("M0001", Utc::now()));
        let aggregate = MemberAggregate::assemble(
            record,
            vec![UserRole::new("member"), UserRole::new(ADMIN_ROLE)],
        );

        assert_eq!(aggregate.roles, vec!["member".to_string(), "admin".to_string()]);
        assert_eq!(aggregate.user_roles.len(), 2);
        assert!(aggregate.has_role(ADMIN_ROLE));
        assert!(!aggregate.has_role("collector"));
    }

    #[test]
    fn test_record_from_store_json() {
        let value = json!({
            "id": "550e8400-e29b-41d4-a716-446655440000",
            "member_number": "M0042",
            "full_name": "Amina Khan",
            "email": "amina@example.org",
            "yearly_payment_amount": 40,
            "updated_at": "2026-01-05T10:00:00+00:00",
            "failed_login_attempts": null,
            "family_members": null,
            "member_notes": [],
            "payment_requests": [{
                "id": "550e8400-e29b-41d4-a716-446655440001",
                "payment_type": "yearly",
                "amount": 40.5,
                "status": "pending",
                "created_at": "2026-01-04T09:00:00+00:00"
            }],
            "auth_user_id": "550e8400-e29b-41d4-a716-446655440009"
        });

        let record: MemberRecord = serde_json::from_value(value).unwrap();
        assert_eq!(record.profile.member_number, "M0042");
        assert!(record.failed_login_attempts.is_none());
        assert!(record.family_members.is_none());
        assert_eq!(record.payment_requests.as_ref().unwrap().len(), 1);

        let aggregate = MemberAggregate::assemble(record, vec![]);
        assert_eq!(aggregate.failed_login_attempts, 0);
        assert_eq!(aggregate.family_members, Vec::<FamilyMember>::new());
    }

    #[test]
    fn test_aggregate_serializes_empty_collections() {
        let record = MemberRecord::new(fixtures::profile("M0003", Utc::now()));
        let value = serde_json::to_value(MemberAggregate::assemble(record, vec![])).unwrap();

        assert_eq!(value["family_members"], json!([]));
        assert_eq!(value["member_notes"], json!([]));
        assert_eq!(value["payment_requests"], json!([]));
        assert_eq!(value["failed_login_attempts"], json!(0));
        assert_eq!(value["member_number"], json!("M0003"));
    }

    #[test]
    fn test_record_requires_member_number() {
        let value = json!({
            "id": "550e8400-e29b-41d4-a716-446655440000",
            "full_name": "No Number",
            "updated_at": "2026-01-05T10:00:00+00:00"
        });
        assert!(serde_json::from_value::<MemberRecord>(value).is_err());
    }
}
