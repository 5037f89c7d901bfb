//! Detached copy of a request's identity, safe to hand to background work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::id::{EmployeeId, OrganizationId, TenantId, UserId};

/// What background work may know about the request that scheduled it.
///
/// Never carries the bearer credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub context_id: Uuid,
    pub user_id: Option<UserId>,
    pub tenant_id: Option<TenantId>,
    pub organization_id: Option<OrganizationId>,
    pub employee_id: Option<EmployeeId>,
    pub language: String,
    pub captured_at: DateTime<Utc>,
}

impl ContextSnapshot {
    /// Snapshot for work not started by a request (startup tasks, batch jobs).
    pub fn system(tenant_id: Option<TenantId>) -> Self {
        Self {
            context_id: Uuid::new_v4(),
            user_id: None,
            tenant_id,
            organization_id: None,
            employee_id: None,
            language: "en".to_string(),
            captured_at: Utc::now(),
        }
    }
}
