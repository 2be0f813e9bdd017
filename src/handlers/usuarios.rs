// src/handlers/usuarios.rs

use axum::{Json, extract::State};

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::rbac::{PermUsuariosRead, RequirePermission},
    models::auth::User,
};

// GET /api/usuarios/sin-rol — la cola de pendientes: usuarios registrados a
// los que nadie ha asignado rol todavía. Mientras estén aquí no tienen
// permiso alguno.
#[utoipa::path(
    get,
    path = "/api/usuarios/sin-rol",
    tag = "usuarios",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Usuarios pendientes de rol", body = Vec<User>))
)]
pub async fn users_without_role(
    State(app_state): State<AppState>,
    _perm: RequirePermission<PermUsuariosRead>,
) -> Result<Json<Vec<User>>, AppError> {
    Ok(Json(app_state.user_repo.users_without_role().await?))
}
