//! Authentication and authorization system.
//!
//! # Modules
//!
//! - [`current_user`]: Extractors for getting the authenticated user in handlers
//! - [`destinations`]: Role to landing-path resolution
//! - [`guard`]: Action-level permission checks inside handlers
//! - [`middleware`]: Navigation gate applied to every request
//! - [`password`]: Argon2 hashing and random credential generation
//! - [`routes`]: Route permission table and path matcher
//! - [`session`]: Signed JWT session tokens
//! - [`verification`]: Email verification, OTP, and password reset lifecycles
//!
//! # Authorization model
//!
//! Access is decided twice on every mutating flow:
//!
//! 1. The navigation gate matches the request path against the route table
//!    and requires every permission the winning rule lists.
//! 2. The handler calls [`guard::require`] with the permissions the concrete
//!    action needs, so a handler can never rely on the gate alone.
//!
//! Both checks read the permission codes embedded in the session claims.

pub mod current_user;
pub mod destinations;
pub mod guard;
pub mod middleware;
pub mod password;
pub mod routes;
pub mod session;
pub mod verification;
