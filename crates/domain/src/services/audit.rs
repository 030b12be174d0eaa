//! Audit entry construction.
//!
//! Entries are built here and written by the persistence layer on the same
//! transaction as the mutation they describe.

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::models::{ActorType, AuditAction, CreateAuditLogInput};

/// Fluent builder for [`CreateAuditLogInput`].
#[derive(Debug, Clone)]
pub struct AuditLogBuilder {
    actor_id: Option<Uuid>,
    actor_type: ActorType,
    action: AuditAction,
    resource_type: String,
    resource_id: Option<String>,
    metadata: Map<String, Value>,
    request_id: Option<String>,
}

impl AuditLogBuilder {
    /// Create a new audit log builder for a user action.
    pub fn user_action(user_id: Uuid, action: AuditAction) -> Self {
        Self::new(Some(user_id), ActorType::User, action)
    }

    /// Create a new audit log builder for a system action.
    pub fn system_action(action: AuditAction) -> Self {
        Self::new(None, ActorType::System, action)
    }

    fn new(actor_id: Option<Uuid>, actor_type: ActorType, action: AuditAction) -> Self {
        Self {
            actor_id,
            actor_type,
            action,
            resource_type: String::new(),
            resource_id: None,
            metadata: Map::new(),
            request_id: None,
        }
    }

    /// Set the resource being acted upon.
    pub fn on_resource(
        mut self,
        resource_type: impl Into<String>,
        resource_id: impl ToString,
    ) -> Self {
        self.resource_type = resource_type.into();
        self.resource_id = Some(resource_id.to_string());
        self
    }

    /// Attach one metadata field.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn build(self) -> CreateAuditLogInput {
        CreateAuditLogInput {
            actor_id: self.actor_id,
            actor_type: self.actor_type,
            action: self.action,
            resource_type: self.resource_type,
            resource_id: self.resource_id,
            metadata: (!self.metadata.is_empty()).then_some(Value::Object(self.metadata)),
            request_id: self.request_id,
        }
    }
}
