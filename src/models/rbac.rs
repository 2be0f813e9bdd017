// src/models/rbac.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::common::error::AppError;

/// Nombres de los módulos del catálogo. La lista autoritativa vive en la
/// tabla `system_modules`; estas constantes existen para que el código
/// (guards, política por defecto) no repita strings sueltos.
pub mod modulos {
    pub const USUARIOS: &str = "usuarios";
    pub const ROLES: &str = "roles";
    pub const CLIENTES: &str = "clientes";
    pub const PROYECTOS: &str = "proyectos";
    pub const CUENTAS_COBRAR: &str = "cuentas_cobrar";
    pub const CUENTAS_PAGAR: &str = "cuentas_pagar";
    pub const COTIZACIONES: &str = "cotizaciones";
    pub const CONTABILIDAD: &str = "contabilidad";
    pub const TABLERO: &str = "tablero";
    pub const REPORTES: &str = "reportes";
    pub const AUDITORIA: &str = "auditoria";
}

// Lo que sale de la base de datos (tabla roles)
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub id: Uuid,

    /// Código estable usado por la tabla de políticas. El nombre es
    /// editable en la UI; el código no, y es el único que puede cargar
    /// lógica.
    #[schema(example = "CONTADOR")]
    pub code: String,

    #[schema(example = "Contador")]
    pub name: String,

    /// Rango informativo (1 = más privilegiado). No otorga acceso por sí
    /// mismo y no implica herencia: cada (rol, módulo, acción) se concede
    /// de forma independiente.
    #[schema(example = 3)]
    pub level: i32,

    #[schema(example = "Acceso completo al módulo contable")]
    pub description: Option<String>,

    pub is_active: bool,

    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

// Lo que sale de la base de datos (tabla system_modules)
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SystemModule {
    #[schema(example = "contabilidad")]
    pub name: String,

    #[schema(example = "Contabilidad")]
    pub display_name: String,

    pub description: Option<String>,

    #[schema(example = "/contabilidad")]
    pub route: String,

    /// Interruptor general del módulo: apagado, nadie lo ve ni lo usa,
    /// tenga el grant que tenga.
    pub is_active: bool,

    /// Indica que la acción `approve` tiene sentido en este módulo.
    pub requires_approval: bool,
}

/// Las seis acciones que un grant puede conceder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
    Export,
    Approve,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::Read,
        Action::Create,
        Action::Update,
        Action::Delete,
        Action::Export,
        Action::Approve,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Export => "export",
            Action::Approve => "approve",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = AppError;

    // Una acción desconocida es un error del llamador, nunca un deny
    // silencioso.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(Action::Read),
            "create" => Ok(Action::Create),
            "update" => Ok(Action::Update),
            "delete" => Ok(Action::Delete),
            "export" => Ok(Action::Export),
            "approve" => Ok(Action::Approve),
            other => Err(AppError::UnknownAction(other.to_string())),
        }
    }
}

/// Los seis booleanos de un grant. `Default` es todo en falso, que es
/// exactamente la semántica de "no hay registro".
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct PermissionSet {
    #[serde(default)]
    pub can_read: bool,
    #[serde(default)]
    pub can_create: bool,
    #[serde(default)]
    pub can_update: bool,
    #[serde(default)]
    pub can_delete: bool,
    #[serde(default)]
    pub can_export: bool,
    #[serde(default)]
    pub can_approve: bool,
}

impl PermissionSet {
    pub fn allows(&self, action: Action) -> bool {
        match action {
            Action::Read => self.can_read,
            Action::Create => self.can_create,
            Action::Update => self.can_update,
            Action::Delete => self.can_delete,
            Action::Export => self.can_export,
            Action::Approve => self.can_approve,
        }
    }
}

// Lo que sale de la base de datos (tabla role_permissions)
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PermissionGrant {
    pub role_id: Uuid,

    #[schema(example = "contabilidad")]
    pub module_name: String,

    #[sqlx(flatten)]
    #[serde(flatten)]
    pub permissions: PermissionSet,
}

// Payload para crear un rol
#[derive(Debug, Deserialize, validator::Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateRolePayload {
    #[validate(length(min = 2, max = 64, message = "El código debe tener entre 2 y 64 caracteres."))]
    #[schema(example = "AUX_CONTABLE")]
    pub code: String,

    #[validate(length(min = 2, max = 128, message = "El nombre debe tener entre 2 y 128 caracteres."))]
    #[schema(example = "Auxiliar contable")]
    pub name: String,

    #[validate(range(min = 1, max = 99, message = "El nivel debe estar entre 1 y 99."))]
    #[schema(example = 4)]
    pub level: i32,

    #[schema(example = "Captura de pólizas, sin autorización de pagos")]
    pub description: Option<String>,
}

// Payload para modificar un rol. El código estable no se toca; deshabilitar
// se hace con is_active, no borrando.
#[derive(Debug, Deserialize, validator::Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRolePayload {
    #[validate(length(min = 2, max = 128, message = "El nombre debe tener entre 2 y 128 caracteres."))]
    pub name: Option<String>,

    #[validate(range(min = 1, max = 99, message = "El nivel debe estar entre 1 y 99."))]
    pub level: Option<i32>,

    pub description: Option<String>,

    pub is_active: Option<bool>,
}

// Payload del interruptor de módulo
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ToggleModulePayload {
    pub is_active: bool,
}

/// Matriz completa de un rol para la pantalla de administración: una
/// entrada por cada módulo activo del catálogo, en falso donde no hay
/// grant. Nunca se omiten módulos: la omisión sería ambigua con "el
/// módulo no existe".
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoleMatrix {
    #[serde(flatten)]
    pub role: Role,

    #[schema(example = json!({"contabilidad": {"canRead": true, "canUpdate": true}}))]
    pub modules: std::collections::BTreeMap<String, PermissionSet>,
}

/// Resultado de la revisión de consistencia de la tabla de grants.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    /// Pares (rol, módulo) con más de un registro. Con la llave única
    /// vigente debería estar siempre vacío.
    pub duplicate_grants: Vec<PermissionGrant>,
    /// Grants que apuntan a módulos fuera del catálogo.
    pub orphan_modules: Vec<String>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.duplicate_grants.is_empty() && self.orphan_modules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_set_por_defecto_niega_todo() {
        let set = PermissionSet::default();
        for action in Action::ALL {
            assert!(!set.allows(action));
        }
    }

    #[test]
    fn allows_responde_solo_por_la_accion_concedida() {
        let set = PermissionSet {
            can_delete: true,
            ..Default::default()
        };
        assert!(set.allows(Action::Delete));
        for action in Action::ALL {
            if action != Action::Delete {
                assert!(!set.allows(action), "no debería permitir {action}");
            }
        }
    }

    #[test]
    fn accion_desconocida_falla_con_ruido() {
        let err = "borrar".parse::<Action>().unwrap_err();
        assert!(matches!(err, AppError::UnknownAction(ref s) if s == "borrar"));
    }

    #[test]
    fn accion_conocida_parsea_ida_y_vuelta() {
        for action in Action::ALL {
            assert_eq!(action.as_str().parse::<Action>().unwrap(), action);
        }
    }

    #[test]
    fn permission_set_acepta_json_parcial() {
        let set: PermissionSet =
            serde_json::from_str(r#"{"canRead": true, "canExport": true}"#).unwrap();
        assert!(set.can_read && set.can_export);
        assert!(!set.can_create && !set.can_update && !set.can_delete && !set.can_approve);
    }
}
