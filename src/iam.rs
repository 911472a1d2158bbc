use crate::error::AuditError;
use async_trait::async_trait;
use rusoto_iam::{
    AccessKeyMetadata, Iam, IamClient, ListAccessKeysRequest, ListAttachedRolePoliciesRequest,
    ListRolePoliciesRequest, ListRolesRequest, ListUsersRequest, Role, User,
};
use tracing::debug;

const PAGE_SIZE: i64 = 1000;

#[async_trait]
pub trait IamDirectory: Send + Sync {
    async fn list_roles(&self) -> Result<Vec<Role>, AuditError>;

    /// Whether `role_name` carries at least one attached or inline policy.
    async fn role_has_policies(&self, role_name: &str) -> Result<bool, AuditError>;

    async fn list_users(&self) -> Result<Vec<User>, AuditError>;

    async fn list_access_keys(&self, user_name: &str) -> Result<Vec<AccessKeyMetadata>, AuditError>;
}

pub struct IamDirectoryClient {
    client: IamClient,
}

impl IamDirectoryClient {
    pub fn new_with_client(client: IamClient) -> Self {
        IamDirectoryClient { client }
    }
}

/// Marker for the next page, if the listing was truncated.
fn next_marker(is_truncated: Option<bool>, marker: Option<String>) -> Option<String> {
    if is_truncated.unwrap_or(false) {
        marker.filter(|marker| !marker.is_empty())
    } else {
        None
    }
}

#[async_trait]
impl IamDirectory for IamDirectoryClient {
    async fn list_roles(&self) -> Result<Vec<Role>, AuditError> {
        let mut roles = vec![];
        let mut marker = None;
        loop {
            let result = self
                .client
                .list_roles(ListRolesRequest {
                    marker: marker.take(),
                    max_items: Some(PAGE_SIZE),
                    ..Default::default()
                })
                .await
                .map_err(|e| AuditError::api("ListRoles", e))?;
            roles.extend(result.roles);
            marker = next_marker(result.is_truncated, result.marker);
            if marker.is_none() {
                break;
            }
        }
        debug!(count = roles.len(), "listed roles");
        Ok(roles)
    }

    async fn role_has_policies(&self, role_name: &str) -> Result<bool, AuditError> {
        let attached = self
            .client
            .list_attached_role_policies(ListAttachedRolePoliciesRequest {
                role_name: role_name.to_string(),
                max_items: Some(1),
                ..Default::default()
            })
            .await
            .map_err(|e| AuditError::api("ListAttachedRolePolicies", e))?;
        if attached
            .attached_policies
            .map_or(false, |policies| !policies.is_empty())
        {
            return Ok(true);
        }

        let inline = self
            .client
            .list_role_policies(ListRolePoliciesRequest {
                role_name: role_name.to_string(),
                max_items: Some(1),
                ..Default::default()
            })
            .await
            .map_err(|e| AuditError::api("ListRolePolicies", e))?;
        Ok(!inline.policy_names.is_empty())
    }

    async fn list_users(&self) -> Result<Vec<User>, AuditError> {
        let mut users = vec![];
        let mut marker = None;
        loop {
            let result = self
                .client
                .list_users(ListUsersRequest {
                    marker: marker.take(),
                    max_items: Some(PAGE_SIZE),
                    ..Default::default()
                })
                .await
                .map_err(|e| AuditError::api("ListUsers", e))?;
            users.extend(result.users);
            marker = next_marker(result.is_truncated, result.marker);
            if marker.is_none() {
                break;
            }
        }
        debug!(count = users.len(), "listed users");
        Ok(users)
    }

    async fn list_access_keys(&self, user_name: &str) -> Result<Vec<AccessKeyMetadata>, AuditError> {
        let mut keys = vec![];
        let mut marker = None;
        loop {
            let result = self
                .client
                .list_access_keys(ListAccessKeysRequest {
                    marker: marker.take(),
                    max_items: Some(PAGE_SIZE),
                    user_name: Some(user_name.to_string()),
                })
                .await
                .map_err(|e| AuditError::api("ListAccessKeys", e))?;
            keys.extend(result.access_key_metadata);
            marker = next_marker(result.is_truncated, result.marker);
            if marker.is_none() {
                break;
            }
        }
        Ok(keys)
    }
}
