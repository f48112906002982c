//! Identity gate.
//!
//! Pure guards evaluated before any scheduling or document operation, in
//! a fixed order: blocked, then email verification, then role and
//! ownership.

use tracing::warn;

use crate::error::AuthError;
use crate::models::{Campus, Role, User};

/// Reject blocked accounts. Used by identity-setup operations that must
/// stay reachable before the email is verified.
pub fn require_not_blocked(user: &User) -> Result<(), AuthError> {
    if user.blocked {
        warn!(user_id = user.id, "blocked user rejected");
        return Err(AuthError::Blocked {
            reason: user
                .block_reason
                .clone()
                .unwrap_or_else(|| "account blocked".to_string()),
        });
    }
    Ok(())
}

/// Reject blocked or unverified accounts.
pub fn require_active(user: &User) -> Result<(), AuthError> {
    require_not_blocked(user)?;
    if !user.email_verified {
        warn!(user_id = user.id, "unverified user rejected");
        return Err(AuthError::EmailUnverified);
    }
    Ok(())
}

pub fn require_staff(user: &User) -> Result<(), AuthError> {
    require_active(user)?;
    if !user.role.is_staff() {
        return Err(AuthError::Forbidden("staff only".into()));
    }
    Ok(())
}

pub fn require_admin(user: &User) -> Result<(), AuthError> {
    require_active(user)?;
    if user.role != Role::Admin {
        return Err(AuthError::Forbidden("admin only".into()));
    }
    Ok(())
}

/// True if `user` may see resources tagged with `campus`.
///
/// Admins see every campus. Staff see their assigned set; untagged
/// resources are visible to all staff.
pub fn can_access_campus(user: &User, campus: Option<Campus>) -> bool {
    match user.role {
        Role::Admin => true,
        Role::Staff => campus.map_or(true, |c| user.campuses.contains(c)),
        Role::Student => false,
    }
}

/// Campus restriction for listings; `None` means unrestricted.
pub fn campus_scope(user: &User) -> Option<Vec<Campus>> {
    match user.role {
        Role::Admin => None,
        Role::Staff | Role::Student => Some(user.campuses.iter().copied().collect()),
    }
}

/// Staff within campus scope.
pub fn require_staff_for(user: &User, campus: Option<Campus>) -> Result<(), AuthError> {
    require_staff(user)?;
    if !can_access_campus(user, campus) {
        warn!(user_id = user.id, campus = ?campus, "staff outside campus scope");
        return Err(AuthError::Forbidden("resource belongs to another campus".into()));
    }
    Ok(())
}

/// Owner, or staff within campus scope.
pub fn require_owner_or_staff(
    user: &User,
    owner_id: i64,
    campus: Option<Campus>,
) -> Result<(), AuthError> {
    require_active(user)?;
    if user.role == Role::Student {
        if user.id != owner_id {
            warn!(user_id = user.id, owner_id, "student acting on another user's resource");
            return Err(AuthError::Forbidden("not the owner".into()));
        }
        return Ok(());
    }
    require_staff_for(user, campus)
}
