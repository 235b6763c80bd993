pub mod admin;
pub mod auth;
pub mod data;
pub mod guard;
pub mod models;
pub mod principles;
pub mod responses;
pub mod revisions;
pub mod router;
pub mod samples;
pub mod state;
pub mod users;

pub use responses::{ApiMessage, json_error};
pub use state::AppState;
