pub mod auth;
pub mod policy;
pub mod rbac;
