pub mod auth;
pub mod provision;
pub mod rbac_service;
