//! Domain module
//!
//! Core domain types: principals, the member aggregate and its relations,
//! notifications and validation errors.

pub mod context;
pub mod error;
pub mod member;
pub mod notification;
pub mod payments;
pub mod principal;

pub use context::{Actor, OperationContext};
pub use error::{validate_email, DomainError};
pub use member::{
    FamilyMember, MemberAggregate, MemberNote, MemberProfile, MemberRecord, PaymentRequest,
    UserRole, ADMIN_ROLE,
};
pub use notification::{Notification, Severity};
pub use payments::{PaymentMethodCounts, PaymentStats};
pub use principal::{AuditRecord, MemberNumber, Principal};
