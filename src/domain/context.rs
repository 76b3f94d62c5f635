//! Request context
//!
//! Who is acting and under which correlation id. The HTTP layer builds one
//! per request from its headers; routes that resolve a session bind it to
//! the signed-in principal before handing it to handlers and the audit log.

use std::net::IpAddr;
use uuid::Uuid;

use super::Principal;

/// On whose behalf an operation runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    /// No session, e.g. the public password reset
    Anonymous,
    Principal(Uuid),
}

impl Actor {
    pub fn principal_id(&self) -> Option<Uuid> {
        match self {
            Self::Anonymous => None,
            Self::Principal(id) => Some(*id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationContext {
    correlation_id: Uuid,
    client_ip: Option<IpAddr>,
    actor: Actor,
}

impl OperationContext {
    /// Anonymous context with a fresh correlation id
    pub fn new() -> Self {
        Self::for_request(Uuid::new_v4(), None)
    }

    /// Anonymous context of an incoming request
    pub fn for_request(correlation_id: Uuid, client_ip: Option<IpAddr>) -> Self {
        Self {
            correlation_id,
            client_ip,
            actor: Actor::Anonymous,
        }
    }

    /// Same request, now acting as `principal`
    pub fn acting_as(&self, principal: &Principal) -> Self {
        Self {
            actor: Actor::Principal(principal.id),
            ..self.clone()
        }
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    pub fn client_ip(&self) -> Option<IpAddr> {
        self.client_ip
    }

    pub fn actor(&self) -> Actor {
        self.actor
    }
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::new()
    }
}
