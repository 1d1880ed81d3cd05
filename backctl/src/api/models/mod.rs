//! API request/response models.

pub mod auth;
pub mod users;
