use uuid::Uuid;

use super::dto::AdminUpdateRequest;
use crate::auth::repo_types::{Role, UserStatus};

/// Rejects changes that would lock the acting admin out of the admin area.
pub fn check_self_change(
    admin_id: Uuid,
    target_id: Uuid,
    req: &AdminUpdateRequest,
) -> Result<(), &'static str> {
    if admin_id != target_id {
        return Ok(());
    }
    if req.role.is_some_and(|r| r != Role::Admin) {
        return Err("You cannot remove your own admin role");
    }
    if req.status.is_some_and(|s| s != UserStatus::Active) {
        return Err("You cannot suspend or deactivate your own account");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admins_cannot_demote_or_suspend_themselves() {
        let me = Uuid::new_v4();
        let demote = AdminUpdateRequest {
            role: Some(Role::User),
            ..Default::default()
        };
        let suspend = AdminUpdateRequest {
            status: Some(UserStatus::Suspended),
            ..Default::default()
        };
        assert!(check_self_change(me, me, &demote).is_err());
        assert!(check_self_change(me, me, &suspend).is_err());
        assert!(check_self_change(me, Uuid::new_v4(), &demote).is_ok());
    }

    #[test]
    fn admins_may_edit_their_own_names() {
        let me = Uuid::new_v4();
        let rename = AdminUpdateRequest {
            first_name: Some("Ada".into()),
            role: Some(Role::Admin),
            status: Some(UserStatus::Active),
            ..Default::default()
        };
        assert!(check_self_change(me, me, &rename).is_ok());
    }
}
