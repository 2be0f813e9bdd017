// src/models/policy.rs
//
// Tabla declarativa de políticas de aprovisionamiento. Sustituye a los
// antiguos scripts de seed que armaban la matriz con switch por nombre de
// rol: aquí todo es dato, keyeado por el código estable del rol.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

use crate::common::error::AppError;
use crate::models::rbac::PermissionSet;

/// Política de un rol: los grants explícitos por módulo más un balde
/// `default` obligatorio que cubre "todos los demás módulos". El balde es
/// obligatorio a propósito: agregar un módulo nuevo al catálogo nunca debe
/// dejar huecos silenciosos en la matriz.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RolePolicy {
    pub code: String,
    pub name: String,
    pub level: i32,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub modules: BTreeMap<String, PermissionSet>,
    pub default: PermissionSet,
}

/// Tabla completa: la política de cada rol que el sistema conoce de fábrica.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PolicyTable {
    pub roles: Vec<RolePolicy>,
}

impl PolicyTable {
    pub fn from_json(raw: &str) -> Result<Self, AppError> {
        let table: PolicyTable = serde_json::from_str(raw)
            .map_err(|e| AppError::InvalidPolicy(format!("JSON inválido: {e}")))?;
        table.validate()?;
        Ok(table)
    }

    fn validate(&self) -> Result<(), AppError> {
        let mut seen = std::collections::BTreeSet::new();
        for role in &self.roles {
            if !seen.insert(role.code.as_str()) {
                return Err(AppError::InvalidPolicy(format!(
                    "código de rol repetido en la tabla: '{}'",
                    role.code
                )));
            }
        }
        Ok(())
    }

    pub fn find(&self, code: &str) -> Option<&RolePolicy> {
        self.roles.iter().find(|r| r.code == code)
    }
}

/// Modo de aprovisionamiento, uno y solo uno por corrida. Los scripts
/// originales mezclaban insert-ignore con drop-and-recreate según el
/// archivo; aquí el llamador lo elige de forma explícita.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionMode {
    /// Conserva los grants existentes; solo inserta los pares que faltan.
    SkipExisting,
    /// Sobrescribe cada par (rol, módulo) con lo que dicte la política.
    Overwrite,
}

// Payload del endpoint de aprovisionamiento
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionPayload {
    pub mode: ProvisionMode,
    pub policy: RolePolicy,
}

/// Resultado de una corrida de aprovisionamiento. `defaulted` lista los
/// módulos que recibieron el balde por defecto, para que un módulo recién
/// agregado al catálogo no pase desapercibido.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionReport {
    pub role_code: String,
    pub mode: ProvisionMode,
    pub created: u64,
    pub skipped: u64,
    pub overwritten: u64,
    pub defaulted: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tabla_valida_parsea() {
        let table = PolicyTable::from_json(
            r#"{
                "roles": [
                    {
                        "code": "CONTADOR",
                        "name": "Contador",
                        "level": 3,
                        "modules": {
                            "contabilidad": {"canRead": true, "canCreate": true, "canUpdate": true, "canExport": true}
                        },
                        "default": {}
                    }
                ]
            }"#,
        )
        .unwrap();

        let contador = table.find("CONTADOR").unwrap();
        let contabilidad = contador.modules.get("contabilidad").unwrap();
        assert!(contabilidad.can_read && contabilidad.can_update);
        assert!(!contabilidad.can_delete);
        assert_eq!(contador.default, PermissionSet::default());
    }

    #[test]
    fn tabla_sin_balde_default_se_rechaza() {
        let err = PolicyTable::from_json(
            r#"{"roles": [{"code": "X", "name": "X", "level": 9, "modules": {}}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidPolicy(_)));
    }

    #[test]
    fn tabla_con_codigo_repetido_se_rechaza() {
        let err = PolicyTable::from_json(
            r#"{
                "roles": [
                    {"code": "X", "name": "Uno", "level": 1, "default": {}},
                    {"code": "X", "name": "Dos", "level": 2, "default": {}}
                ]
            }"#,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidPolicy(ref m) if m.contains("repetido")));
    }

    #[test]
    fn la_politica_de_fabrica_embebida_es_valida() {
        let table = PolicyTable::from_json(include_str!("../../config/policy.default.json"))
            .expect("la política de fábrica debe parsear");
        assert!(table.find("SUPER_ADMIN").is_some());
        assert!(table.find("CONTADOR").is_some());
        assert!(table.find("INVITADO").is_some());

        // El invitado no recibe nada por defecto.
        let invitado = table.find("INVITADO").unwrap();
        assert_eq!(invitado.default, PermissionSet::default());
    }
}
