// src/docs.rs

use utoipa::OpenApi;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};

use crate::handlers;
use crate::models;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- Auth ---
        handlers::auth::register,
        handlers::auth::login,
        handlers::auth::get_me,

        // --- RBAC ---
        handlers::rbac::list_roles,
        handlers::rbac::create_role,
        handlers::rbac::update_role,
        handlers::rbac::role_matrix,
        handlers::rbac::update_grant,
        handlers::rbac::provision_role,
        handlers::rbac::list_modules,
        handlers::rbac::toggle_module,
        handlers::rbac::my_menu,
        handlers::rbac::check_permission,
        handlers::rbac::check_integrity,

        // --- Usuarios ---
        handlers::usuarios::users_without_role,
    ),
    components(
        schemas(
            models::auth::User,
            models::auth::RegisterUserPayload,
            models::auth::LoginUserPayload,
            models::auth::AuthResponse,
            models::rbac::Role,
            models::rbac::SystemModule,
            models::rbac::Action,
            models::rbac::PermissionSet,
            models::rbac::PermissionGrant,
            models::rbac::CreateRolePayload,
            models::rbac::UpdateRolePayload,
            models::rbac::ToggleModulePayload,
            models::rbac::RoleMatrix,
            models::rbac::IntegrityReport,
            models::policy::RolePolicy,
            models::policy::PolicyTable,
            models::policy::ProvisionMode,
            models::policy::ProvisionPayload,
            models::policy::ProvisionReport,
            handlers::rbac::CheckPermissionResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Registro, login y sesión"),
        (name = "rbac", description = "Roles, módulos y matriz de permisos"),
        (name = "usuarios", description = "Gestión de usuarios")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}
