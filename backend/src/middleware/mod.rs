//! Request middleware

pub mod auth;

pub use auth::{auth_middleware, CurrentUser, Operator, Role};
