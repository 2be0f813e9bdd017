pub mod rbac_repo;
pub mod user_repo;

pub use rbac_repo::RbacRepository;
pub use user_repo::UserRepository;
