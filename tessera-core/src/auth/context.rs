//! Identity attached to a single inbound request.

use crate::error::{AuthError, AuthResult};
use crate::user::User;

/// Who made the request, if anyone could be established.
///
/// An unauthenticated value is the normal state for requests that carried no
/// credential or a credential that failed validation; it is the role and
/// authentication checks that reject, not the extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthInfo {
    user: Option<User>,
}

impl AuthInfo {
    pub fn authenticated(user: User) -> Self {
        Self { user: Some(user) }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// Exact, case-sensitive match against the user's role name. There is no
    /// role hierarchy: `Admin` does not satisfy a `Manager` requirement.
    pub fn has_role(&self, role: &str) -> bool {
        self.user
            .as_ref()
            .is_some_and(|user| user.role.as_str() == role)
    }

    pub fn require_authenticated(&self) -> AuthResult<&User> {
        self.user
            .as_ref()
            .ok_or_else(|| AuthError::unauthorized("authentication required"))
    }

    /// Unauthorized when nobody is signed in or the role does not match.
    pub fn require_role(&self, role: &str) -> AuthResult<&User> {
        let user = self.require_authenticated()?;
        if user.role.as_str() != role {
            return Err(AuthError::unauthorized(
                "insufficient role for this action",
            ));
        }
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::user::UserRole;

    fn info(role: UserRole) -> AuthInfo {
        AuthInfo::authenticated(User::new("u1", "alice", "hash", role).unwrap())
    }

    #[test]
    fn anonymous_has_no_roles() {
        let anon = AuthInfo::anonymous();
        assert!(!anon.is_authenticated());
        assert!(anon.user().is_none());
        assert!(!anon.has_role("Admin"));
        assert_eq!(
            anon.require_authenticated().unwrap_err().kind(),
            ErrorKind::Unauthorized
        );
    }

    #[test]
    fn role_match_is_exact() {
        let admin = info(UserRole::Admin);
        assert!(admin.has_role("Admin"));
        assert!(!admin.has_role("Manager"));
        assert!(!admin.has_role("admin"));
        assert!(admin.require_role("Admin").is_ok());
        assert_eq!(
            admin.require_role("Manager").unwrap_err().kind(),
            ErrorKind::Unauthorized
        );
    }
}
