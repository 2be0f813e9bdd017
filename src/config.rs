// src/config.rs

use sqlx::{PgPool, postgres::PgPoolOptions};
use std::{env, time::Duration};

use crate::{
    db::{RbacRepository, UserRepository},
    services::{auth::AuthService, provision::ProvisionService, rbac_service::RbacService},
};

// El estado compartido, accesible en toda la aplicación
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub user_repo: UserRepository,
    pub auth_service: AuthService,
    pub rbac_service: RbacService,
    pub provision_service: ProvisionService,
}

impl AppState {
    pub async fn new() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")?;
        let jwt_secret = env::var("JWT_SECRET")?;

        let db_pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&database_url)
            .await?;

        tracing::info!("✅ Conexión con la base de datos establecida");

        // --- Arma el grafo de dependencias ---
        let user_repo = UserRepository::new(db_pool.clone());
        let rbac_repo = RbacRepository::new(db_pool.clone());

        let auth_service = AuthService::new(user_repo.clone(), jwt_secret);
        let rbac_service = RbacService::new(rbac_repo.clone());
        let provision_service =
            ProvisionService::new(rbac_repo, rbac_service.clone(), db_pool.clone());

        Ok(Self {
            db_pool,
            user_repo,
            auth_service,
            rbac_service,
            provision_service,
        })
    }

    /// Siembra de fábrica, controlada por SEED_DEFAULT_ROLES.
    pub fn seed_enabled() -> bool {
        env::var("SEED_DEFAULT_ROLES")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false)
    }
}
