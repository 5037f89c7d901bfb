use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use worklane_core::{ContextSnapshot, TenantId};

/// A notification published after a mutation commits.
///
/// Notification consumers run after the originating request has finished, so the
/// envelope carries a [`ContextSnapshot`] instead of the live context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEnvelope<E> {
    notification_id: Uuid,
    tenant_id: TenantId,
    kind: String,
    occurred_at: DateTime<Utc>,
    context: ContextSnapshot,
    payload: E,
}

impl<E> NotificationEnvelope<E> {
    pub fn new(
        tenant_id: TenantId,
        kind: impl Into<String>,
        context: ContextSnapshot,
        payload: E,
    ) -> Self {
        Self {
            notification_id: Uuid::now_v7(),
            tenant_id,
            kind: kind.into(),
            occurred_at: Utc::now(),
            context,
            payload,
        }
    }

    pub fn notification_id(&self) -> Uuid {
        self.notification_id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn context(&self) -> &ContextSnapshot {
        &self.context
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}
