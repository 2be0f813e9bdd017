// src/handlers/rbac.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use std::collections::BTreeSet;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::{
        auth::AuthenticatedUser,
        rbac::{
            PermAuditoriaRead, PermRolesCreate, PermRolesRead, PermRolesUpdate, RequirePermission,
        },
    },
    models::policy::{ProvisionPayload, ProvisionReport},
    models::rbac::{
        Action, CreateRolePayload, IntegrityReport, PermissionGrant, PermissionSet, Role,
        RoleMatrix, SystemModule, ToggleModulePayload, UpdateRolePayload,
    },
};

// --- Roles ---

// GET /api/roles
#[utoipa::path(
    get,
    path = "/api/roles",
    tag = "rbac",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Todos los roles", body = Vec<Role>))
)]
pub async fn list_roles(
    State(app_state): State<AppState>,
    _perm: RequirePermission<PermRolesRead>,
) -> Result<Json<Vec<Role>>, AppError> {
    Ok(Json(app_state.rbac_service.list_roles().await?))
}

// POST /api/roles
#[utoipa::path(
    post,
    path = "/api/roles",
    tag = "rbac",
    security(("bearer_auth" = [])),
    request_body = CreateRolePayload,
    responses(
        (status = 201, description = "Rol creado", body = Role),
        (status = 409, description = "Código o nombre repetido")
    )
)]
pub async fn create_role(
    State(app_state): State<AppState>,
    _perm: RequirePermission<PermRolesCreate>,
    Json(payload): Json<CreateRolePayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate().map_err(AppError::ValidationError)?;
    let role = app_state.rbac_service.create_role(payload).await?;
    Ok((StatusCode::CREATED, Json(role)))
}

// PATCH /api/roles/{id}
#[utoipa::path(
    patch,
    path = "/api/roles/{id}",
    tag = "rbac",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "ID del rol")),
    request_body = UpdateRolePayload,
    responses(
        (status = 200, description = "Rol actualizado", body = Role),
        (status = 404, description = "Rol no encontrado")
    )
)]
pub async fn update_role(
    State(app_state): State<AppState>,
    _perm: RequirePermission<PermRolesUpdate>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateRolePayload>,
) -> Result<Json<Role>, AppError> {
    payload.validate().map_err(AppError::ValidationError)?;
    Ok(Json(app_state.rbac_service.update_role(id, payload).await?))
}

// --- Matriz de permisos ---

// GET /api/roles/{id}/permisos — la matriz completa, incluyendo los módulos
// sin grant (en falso), para que la pantalla de administración nunca
// esconda un "existe pero no está configurado".
#[utoipa::path(
    get,
    path = "/api/roles/{id}/permisos",
    tag = "rbac",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "ID del rol")),
    responses(
        (status = 200, description = "Matriz del rol", body = RoleMatrix),
        (status = 404, description = "Rol no encontrado")
    )
)]
pub async fn role_matrix(
    State(app_state): State<AppState>,
    _perm: RequirePermission<PermRolesRead>,
    Path(id): Path<Uuid>,
) -> Result<Json<RoleMatrix>, AppError> {
    Ok(Json(app_state.rbac_service.summarize(id).await?))
}

// PUT /api/roles/{id}/permisos/{modulo}
#[utoipa::path(
    put,
    path = "/api/roles/{id}/permisos/{modulo}",
    tag = "rbac",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "ID del rol"),
        ("modulo" = String, Path, description = "Nombre del módulo")
    ),
    request_body = PermissionSet,
    responses(
        (status = 200, description = "Grant actualizado", body = PermissionGrant),
        (status = 400, description = "Módulo fuera del catálogo")
    )
)]
pub async fn update_grant(
    State(app_state): State<AppState>,
    _perm: RequirePermission<PermRolesUpdate>,
    Path((id, modulo)): Path<(Uuid, String)>,
    Json(set): Json<PermissionSet>,
) -> Result<Json<PermissionGrant>, AppError> {
    let grant = app_state
        .rbac_service
        .update_grant(id, &modulo, set)
        .await?;
    Ok(Json(grant))
}

// POST /api/roles/{id}/aprovisionar — corrida masiva con política
// declarativa y modo explícito.
#[utoipa::path(
    post,
    path = "/api/roles/{id}/aprovisionar",
    tag = "rbac",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "ID del rol")),
    request_body = ProvisionPayload,
    responses(
        (status = 200, description = "Reporte de la corrida", body = ProvisionReport),
        (status = 404, description = "Rol no encontrado")
    )
)]
pub async fn provision_role(
    State(app_state): State<AppState>,
    _perm: RequirePermission<PermRolesUpdate>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ProvisionPayload>,
) -> Result<Json<ProvisionReport>, AppError> {
    let role = app_state
        .rbac_service
        .find_role(id)
        .await?
        .ok_or(AppError::RoleNotFound)?;

    // La política viaja keyeada por código estable; si no coincide con el
    // rol de la URL, alguien está aplicando la tabla equivocada.
    if payload.policy.code != role.code {
        return Err(AppError::InvalidPolicy(format!(
            "la política es para '{}', el rol es '{}'",
            payload.policy.code, role.code
        )));
    }

    let report = app_state
        .provision_service
        .provision_role(&role, &payload.policy, payload.mode)
        .await?;
    Ok(Json(report))
}

// --- Catálogo de módulos ---

// GET /api/modulos
#[utoipa::path(
    get,
    path = "/api/modulos",
    tag = "rbac",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Catálogo completo", body = Vec<SystemModule>))
)]
pub async fn list_modules(
    State(app_state): State<AppState>,
    _perm: RequirePermission<PermRolesRead>,
) -> Result<Json<Vec<SystemModule>>, AppError> {
    Ok(Json(app_state.rbac_service.list_modules().await?))
}

// PATCH /api/modulos/{nombre} — el interruptor general del módulo.
#[utoipa::path(
    patch,
    path = "/api/modulos/{nombre}",
    tag = "rbac",
    security(("bearer_auth" = [])),
    params(("nombre" = String, Path, description = "Nombre del módulo")),
    request_body = ToggleModulePayload,
    responses(
        (status = 200, description = "Módulo actualizado", body = SystemModule),
        (status = 400, description = "Módulo fuera del catálogo")
    )
)]
pub async fn toggle_module(
    State(app_state): State<AppState>,
    _perm: RequirePermission<PermRolesUpdate>,
    Path(nombre): Path<String>,
    Json(payload): Json<ToggleModulePayload>,
) -> Result<Json<SystemModule>, AppError> {
    let module = app_state
        .rbac_service
        .set_module_active(&nombre, payload.is_active)
        .await?;
    Ok(Json(module))
}

// --- Vistas del usuario actual ---

// GET /api/menu — los módulos que el usuario puede al menos leer, para el
// menú de navegación. Cosmético: el check autoritativo vive en los guards.
#[utoipa::path(
    get,
    path = "/api/menu",
    tag = "rbac",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Módulos accesibles", body = Vec<String>))
)]
pub async fn my_menu(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<BTreeSet<String>>, AppError> {
    let menu = app_state
        .rbac_service
        .accessible_modules(user.role_id)
        .await?;
    Ok(Json(menu))
}

#[derive(serde::Deserialize, utoipa::IntoParams)]
pub struct CheckPermissionQuery {
    pub modulo: String,
    pub accion: String,
}

#[derive(serde::Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckPermissionResponse {
    pub allowed: bool,
}

// GET /api/permisos/verificar — consulta puntual para la UI ("¿puedo?").
// Una acción desconocida o un módulo fuera del catálogo regresan 400: son
// errores del llamador, no un deny.
#[utoipa::path(
    get,
    path = "/api/permisos/verificar",
    tag = "rbac",
    security(("bearer_auth" = [])),
    params(CheckPermissionQuery),
    responses(
        (status = 200, description = "Veredicto del evaluador", body = CheckPermissionResponse),
        (status = 400, description = "Acción o módulo desconocidos")
    )
)]
pub async fn check_permission(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(query): Query<CheckPermissionQuery>,
) -> Result<Json<CheckPermissionResponse>, AppError> {
    let accion: Action = query.accion.parse()?;
    let allowed = app_state
        .rbac_service
        .can(user.role_id, &query.modulo, accion)
        .await?;
    Ok(Json(CheckPermissionResponse { allowed }))
}

// --- Consistencia ---

// GET /api/permisos/integridad
#[utoipa::path(
    get,
    path = "/api/permisos/integridad",
    tag = "rbac",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Reporte de consistencia", body = IntegrityReport))
)]
pub async fn check_integrity(
    State(app_state): State<AppState>,
    _perm: RequirePermission<PermAuditoriaRead>,
) -> Result<Json<IntegrityReport>, AppError> {
    Ok(Json(app_state.rbac_service.verify_integrity().await?))
}
