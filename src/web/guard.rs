//! Role and ownership checks shared by every handler.
//!
//! Handlers resolve the caller first (see [`crate::web::auth::require_user`]) and
//! then ask [`authorize`] whether the caller may perform an [`Access`].

use uuid::Uuid;

use crate::web::{
    auth::AuthUser,
    responses::{ApiResult, forbidden},
};

pub const NOT_ENOUGH_PRIVILEGES: &str = "The user doesn't have enough privileges";
pub const SUPERUSER_SELF_DELETE: &str = "Super users are not allowed to delete themselves";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    /// Any active, logged-in user.
    Authenticated,
    /// The owner of the resource, or a superuser.
    SelfOrSuperuser(Uuid),
    Superuser,
    /// Removing the account with the given id.
    DeleteUser(Uuid),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(&'static str),
}

pub fn authorize(caller: &AuthUser, access: Access) -> Decision {
    match access {
        Access::Authenticated => Decision::Allow,
        Access::SelfOrSuperuser(target) => {
            if caller.is_self(target) || caller.is_superuser() {
                Decision::Allow
            } else {
                Decision::Deny(NOT_ENOUGH_PRIVILEGES)
            }
        }
        Access::Superuser => {
            if caller.is_superuser() {
                Decision::Allow
            } else {
                Decision::Deny(NOT_ENOUGH_PRIVILEGES)
            }
        }
        Access::DeleteUser(target) => match (caller.is_self(target), caller.is_superuser()) {
            (true, true) => Decision::Deny(SUPERUSER_SELF_DELETE),
            (true, false) | (false, true) => Decision::Allow,
            (false, false) => Decision::Deny(NOT_ENOUGH_PRIVILEGES),
        },
    }
}

/// [`authorize`] turned into a 403 response on denial.
pub fn require(caller: &AuthUser, access: Access) -> ApiResult<()> {
    match authorize(caller, access) {
        Decision::Allow => Ok(()),
        Decision::Deny(reason) => Err(forbidden(reason)),
    }
}
