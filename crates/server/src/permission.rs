//! Membership-based permission checks.

use crate::error::EventError;
use std::sync::Arc;
use tandem_core::model::MemberRole;
use tandem_repository::ListStore;
use uuid::Uuid;

/// Action a user attempts on a list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Read,
    Write,
    Share,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Share => "share",
        }
    }
}

/// Whether a role allows an action. Owners may do anything, editors read
/// and write, viewers only read.
pub fn role_allows(role: MemberRole, action: Action) -> bool {
    match role {
        MemberRole::Owner => true,
        MemberRole::Editor => matches!(action, Action::Read | Action::Write),
        MemberRole::Viewer => matches!(action, Action::Read),
    }
}

/// Resolves whether a user may act on a list by consulting membership.
pub struct PermissionService {
    repository: Arc<dyn ListStore>,
}

impl PermissionService {
    pub fn new(repository: Arc<dyn ListStore>) -> Self {
        Self { repository }
    }

    /// The user's role on the list, if any.
    pub async fn role(&self, list_id: Uuid, user_id: Uuid) -> Result<Option<MemberRole>, EventError> {
        let member = self.repository.get_member(list_id, user_id).await?;
        Ok(member.map(|m| m.role))
    }

    /// Reject with `permission_denied` unless the user's role allows the
    /// action. Non-members are always rejected.
    pub async fn require(
        &self,
        user_id: Uuid,
        list_id: Uuid,
        action: Action,
    ) -> Result<(), EventError> {
        match self.role(list_id, user_id).await? {
            Some(role) if role_allows(role, action) => Ok(()),
            _ => Err(EventError::PermissionDenied(format!(
                "user {user_id} may not {} list {list_id}",
                action.as_str()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_matrix() {
        use Action::*;
        use MemberRole::*;

        for action in [Read, Write, Share] {
            assert!(role_allows(Owner, action));
        }
        assert!(role_allows(Editor, Read));
        assert!(role_allows(Editor, Write));
        assert!(!role_allows(Editor, Share));
        assert!(role_allows(Viewer, Read));
        assert!(!role_allows(Viewer, Write));
        assert!(!role_allows(Viewer, Share));
    }
}
