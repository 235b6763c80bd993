mod auth;
mod users;

pub use auth::require_superuser;
pub use users::{create_user, delete_user, read_non_superusers, update_user};
