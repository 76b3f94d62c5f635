//! Command definitions
//!
//! Commands represent intentions to change the system state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{validate_email, DomainError, MemberNumber};

// =========================================================================
// UpdateMemberCommand
// =========================================================================

/// Editable member fields. `member_number` and `collector` are accepted only
/// so that attempts to change them can be rejected explicitly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemberChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub town: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postcode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collector: Option<String>,
}

impl MemberChanges {
    /// Trim values and check them. Blank optional fields are cleared.
    pub fn validate(mut self) -> Result<Self, DomainError> {
        if self.member_number.is_some() {
            return Err(DomainError::ImmutableField("member_number"));
        }
        if self.collector.is_some() {
            return Err(DomainError::ImmutableField("collector"));
        }

        let trim = |value: &mut Option<String>| {
            if let Some(v) = value.as_mut() {
                *v = v.trim().to_string();
            }
        };
        for field in [
            &mut self.full_name,
            &mut self.email,
            &mut self.phone,
            &mut self.address,
            &mut self.town,
            &mut self.postcode,
        ] {
            trim(field);
        }

        if self.full_name.as_deref() == Some("") {
            return Err(DomainError::BlankField("full_name"));
        }
        if let Some(email) = self.email.as_deref().filter(|e| !e.is_empty()) {
            validate_email(email)?;
        }
        if self.changed_fields().is_empty() {
            return Err(DomainError::NoChanges);
        }
        Ok(self)
    }

    /// Names of the fields carrying a value
    pub fn changed_fields(&self) -> Vec<String> {
        self.columns()
            .into_iter()
            .map(|(column, _)| column.to_string())
            .collect()
    }

    /// `(column, value)` pairs to write; empty strings become NULL.
    pub fn columns(&self) -> Vec<(&'static str, Option<&str>)> {
        [
            ("full_name", &self.full_name),
            ("email", &self.email),
            ("phone", &self.phone),
            ("address", &self.address),
            ("town", &self.town),
            ("postcode", &self.postcode),
        ]
        .into_iter()
        .filter_map(|(column, value)| {
            value
                .as_deref()
                .map(|v| (column, (!v.is_empty()).then_some(v)))
        })
        .collect()
    }
}

/// Command to edit a member's contact details
#[derive(Debug, Clone)]
pub struct UpdateMemberCommand {
    pub member_id: Uuid,
    pub changes: MemberChanges,
}

impl UpdateMemberCommand {
    pub fn new(member_id: Uuid, changes: MemberChanges) -> Self {
        Self { member_id, changes }
    }
}

/// Result of a successful member update
#[derive(Debug, Clone, Serialize)]
pub struct UpdateMemberResult {
    pub member_id: Uuid,
    /// Principal linked to the member, whose cached profile is now outdated
    pub auth_user_id: Option<Uuid>,
    pub changed_fields: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

// =========================================================================
// RequestPasswordResetCommand
// =========================================================================

/// Command to send a password reset link to a member
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestPasswordResetCommand {
    pub member_number: String,
    pub email: String,
}

impl RequestPasswordResetCommand {
    pub fn new(member_number: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            member_number: member_number.into(),
            email: email.into(),
        }
    }

    /// Parsed member number and trimmed email
    pub fn validate(&self) -> Result<(MemberNumber, String), DomainError> {
        let member_number =
            MemberNumber::parse(&self.member_number).ok_or(DomainError::InvalidMemberNumber)?;
        let email = self.email.trim().to_string();
        validate_email(&email)?;
        Ok((member_number, email))
    }
}

/// Result of a queued password reset
#[derive(Debug, Clone, Serialize)]
pub struct PasswordResetResult {
    pub member_number: String,
    pub email_id: Uuid,
    pub expires_at: DateTime<Utc>,
}
