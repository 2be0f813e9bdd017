// src/middleware/rbac.rs

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use std::marker::PhantomData;

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::auth::AuthenticatedUser,
    models::auth::User,
    models::rbac::{Action, modulos},
};

/// Lo que un guard exige: un módulo del catálogo y una de las seis
/// acciones. El chequeo del servidor es el autoritativo; lo que la UI
/// esconda o muestre es solo cosmético.
pub trait PermissionDef: Send + Sync + 'static {
    const MODULE: &'static str;
    const ACTION: Action;
}

/// El extractor guardián: ponerlo en la firma de un handler exige el
/// permiso antes de ejecutar nada, sin efectos parciales.
pub struct RequirePermission<T>(pub PhantomData<T>);

impl<T, S> FromRequestParts<S> for RequirePermission<T>
where
    T: PermissionDef,
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);

        // El auth_guard ya debió dejar el usuario aquí.
        let user = parts
            .extensions
            .get::<User>()
            .cloned()
            .map(AuthenticatedUser)
            .ok_or(AppError::InvalidToken)?;

        // Sin rol (role_id NULL) el evaluador responde false en todas
        // partes: el usuario pendiente no hereda ningún acceso.
        let allowed = app_state
            .rbac_service
            .can(user.0.role_id, T::MODULE, T::ACTION)
            .await?;

        if !allowed {
            return Err(AppError::Forbidden {
                modulo: T::MODULE.to_string(),
                accion: T::ACTION.to_string(),
            });
        }

        Ok(RequirePermission(PhantomData))
    }
}

// ---
// DEFINICIÓN DE LOS PERMISOS (TIPOS)
// ---

macro_rules! permiso {
    ($nombre:ident, $modulo:expr, $accion:expr) => {
        pub struct $nombre;
        impl PermissionDef for $nombre {
            const MODULE: &'static str = $modulo;
            const ACTION: Action = $accion;
        }
    };
}

permiso!(PermRolesRead, modulos::ROLES, Action::Read);
permiso!(PermRolesCreate, modulos::ROLES, Action::Create);
permiso!(PermRolesUpdate, modulos::ROLES, Action::Update);
permiso!(PermUsuariosRead, modulos::USUARIOS, Action::Read);
permiso!(PermAuditoriaRead, modulos::AUDITORIA, Action::Read);
