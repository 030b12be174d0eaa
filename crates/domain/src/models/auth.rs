//! Verified caller identity passed to every command.

use uuid::Uuid;

/// Permission required for organizer operations on batches and invites.
pub const PERMISSION_MANAGE_REGISTRATIONS: &str = "registrations:manage";

/// Permission required for billing administration.
pub const PERMISSION_BILLING_ADMIN: &str = "billing:admin";

/// Held by the account service to report account events such as email
/// verification.
pub const PERMISSION_MANAGE_USERS: &str = "users:manage";

/// Session context resolved by the auth layer. Commands trust it as verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub is_internal: bool,
    pub permissions: Vec<String>,
}

impl AuthContext {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            is_internal: false,
            permissions: Vec::new(),
        }
    }

    pub fn with_permissions(mut self, permissions: &[&str]) -> Self {
        self.permissions = permissions.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn internal(mut self) -> Self {
        self.is_internal = true;
        self
    }

    /// Internal staff implicitly hold every permission.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.is_internal || self.permissions.iter().any(|p| p == permission)
    }
}
