// src/services/auth.rs

use bcrypt::{hash, verify};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::UserRepository,
    models::auth::{Claims, User},
};

#[derive(Clone)]
pub struct AuthService {
    user_repo: UserRepository,
    jwt_secret: String,
}

impl AuthService {
    pub fn new(user_repo: UserRepository, jwt_secret: String) -> Self {
        Self { user_repo, jwt_secret }
    }

    pub async fn register_user(&self, email: &str, password: &str) -> Result<String, AppError> {
        // El hashing es pesado: fuera del executor async.
        let password_owned = password.to_owned();
        let password_hash = tokio::task::spawn_blocking(move || {
            hash(&password_owned, bcrypt::DEFAULT_COST)
        })
        .await
        .map_err(|e| anyhow::anyhow!("Falla en la tarea de hashing: {e}"))??;

        // El usuario nace sin rol: queda en la cola de pendientes hasta que
        // un administrador le asigne uno.
        let user = self.user_repo.create_user(email, &password_hash).await?;
        tracing::info!(usuario = %user.email, "Usuario registrado, pendiente de rol");

        self.generate_token(user.id)
    }

    pub async fn login_user(&self, email: &str, password: &str) -> Result<String, AppError> {
        let user = self
            .user_repo
            .find_by_email(email)
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        let password_owned = password.to_owned();
        let hash_owned = user.password_hash.clone();
        let valid = tokio::task::spawn_blocking(move || verify(&password_owned, &hash_owned))
            .await
            .map_err(|e| anyhow::anyhow!("Falla en la tarea de verificación: {e}"))??;

        if !valid {
            return Err(AppError::InvalidCredentials);
        }

        self.generate_token(user.id)
    }

    // Decodifica el token y recarga el usuario de la base de datos: un cambio de rol
    // (o su retiro) surte efecto en la siguiente petición, sin esperar a
    // que el token expire.
    pub async fn validate_token(&self, token: &str) -> Result<User, AppError> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|_| AppError::InvalidToken)?;

        self.user_repo
            .find_by_id(data.claims.sub)
            .await?
            .ok_or(AppError::InvalidToken)
    }

    fn generate_token(&self, user_id: Uuid) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            iat: now.timestamp() as usize,
            exp: (now + chrono::Duration::hours(8)).timestamp() as usize,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )?;
        Ok(token)
    }
}
