// src/services/provision.rs
//
// Aprovisionamiento masivo de grants: dado un rol y su política declarativa,
// escribe un registro por cada módulo del catálogo dentro de una sola
// transacción. Reemplaza a los cinco scripts de seed casi idénticos del
// sistema anterior con una única ruta, keyeada por código de rol.

use sqlx::PgPool;

use crate::common::error::AppError;
use crate::db::RbacRepository;
use crate::models::policy::{PolicyTable, ProvisionMode, ProvisionReport, RolePolicy};
use crate::models::rbac::{PermissionSet, Role, SystemModule};
use crate::services::rbac_service::RbacService;

/// Tabla de fábrica, versionada junto al código.
const DEFAULT_POLICY_JSON: &str = include_str!("../../config/policy.default.json");

/// Plan de escritura: un par (módulo, permisos) por cada módulo del
/// catálogo, más la lista de módulos que cayeron en el balde `default` de
/// la política. Referirse a un módulo fuera del catálogo es un error de
/// configuración, no algo que se ignora.
pub fn plan_grants(
    catalog: &[SystemModule],
    policy: &RolePolicy,
) -> Result<(Vec<(String, PermissionSet)>, Vec<String>), AppError> {
    for module in policy.modules.keys() {
        if !catalog.iter().any(|m| &m.name == module) {
            return Err(AppError::ModuleNotFound(module.clone()));
        }
    }

    let mut plan = Vec::with_capacity(catalog.len());
    let mut defaulted = Vec::new();
    for module in catalog {
        match policy.modules.get(&module.name) {
            Some(set) => plan.push((module.name.clone(), *set)),
            None => {
                plan.push((module.name.clone(), policy.default));
                defaulted.push(module.name.clone());
            }
        }
    }
    Ok((plan, defaulted))
}

#[derive(Clone)]
pub struct ProvisionService {
    repo: RbacRepository,
    rbac: RbacService,
    pool: PgPool,
}

impl ProvisionService {
    pub fn new(repo: RbacRepository, rbac: RbacService, pool: PgPool) -> Self {
        Self { repo, rbac, pool }
    }

    /// Aprovisiona un rol con un modo explícito, uno solo por corrida. La
    /// operación es idempotente: correrla dos veces con la misma política
    /// deja exactamente los mismos registros.
    pub async fn provision_role(
        &self,
        role: &Role,
        policy: &RolePolicy,
        mode: ProvisionMode,
    ) -> Result<ProvisionReport, AppError> {
        // Una tabla de grants corrupta vuelve fatal el aprovisionamiento:
        // primero se reconcilia el dato, después se escribe.
        let integrity = self.rbac.verify_integrity().await?;
        if !integrity.is_clean() {
            if let Some(dup) = integrity.duplicate_grants.first() {
                return Err(AppError::DuplicateGrant {
                    role_id: dup.role_id,
                    module_name: dup.module_name.clone(),
                });
            }
            return Err(anyhow::anyhow!(
                "grants huérfanos hacia módulos fuera del catálogo: {:?}",
                integrity.orphan_modules
            )
            .into());
        }

        let catalog = self.repo.list_modules().await?;
        let (plan, defaulted) = plan_grants(&catalog, policy)?;

        // Todo o nada: un rol jamás queda con la matriz a medias.
        let mut tx = self.pool.begin().await?;

        let existing = self
            .repo
            .grant_modules_for_role(&mut *tx, role.id)
            .await?;

        let mut created = 0u64;
        let mut skipped = 0u64;
        let mut overwritten = 0u64;
        for (module, set) in &plan {
            match mode {
                ProvisionMode::SkipExisting => {
                    if self
                        .repo
                        .insert_grant_skip(&mut *tx, role.id, module, *set)
                        .await?
                    {
                        created += 1;
                    } else {
                        skipped += 1;
                    }
                }
                ProvisionMode::Overwrite => {
                    self.repo
                        .insert_grant_overwrite(&mut *tx, role.id, module, *set)
                        .await?;
                    if existing.contains(module) {
                        overwritten += 1;
                    } else {
                        created += 1;
                    }
                }
            }
        }

        tx.commit().await?;
        self.rbac.invalidate_role(role.id).await;

        let report = ProvisionReport {
            role_code: role.code.clone(),
            mode,
            created,
            skipped,
            overwritten,
            defaulted,
        };
        tracing::info!(
            rol = %report.role_code,
            creados = report.created,
            conservados = report.skipped,
            sobrescritos = report.overwritten,
            con_default = report.defaulted.len(),
            "Aprovisionamiento de rol completado"
        );
        if !report.defaulted.is_empty() {
            tracing::warn!(
                rol = %report.role_code,
                modulos = ?report.defaulted,
                "Módulos sin decisión explícita en la política: recibieron el balde default"
            );
        }
        Ok(report)
    }

    /// Siembra los roles de fábrica desde la tabla embebida, en modo
    /// `SkipExisting` para no pisar lo que un administrador ya haya
    /// ajustado.
    pub async fn provision_defaults(&self) -> Result<Vec<ProvisionReport>, AppError> {
        let table = PolicyTable::from_json(DEFAULT_POLICY_JSON)?;

        let mut reports = Vec::with_capacity(table.roles.len());
        for policy in &table.roles {
            let role = match self.repo.find_role_by_code(&policy.code).await? {
                Some(role) => role,
                None => {
                    self.repo
                        .create_role(
                            &policy.code,
                            &policy.name,
                            policy.level,
                            policy.description.as_deref(),
                        )
                        .await?
                }
            };
            reports.push(
                self.provision_role(&role, policy, ProvisionMode::SkipExisting)
                    .await?,
            );
        }
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::rbac::modulos;
    use std::collections::BTreeMap;

    fn modulo(name: &str) -> SystemModule {
        SystemModule {
            name: name.to_string(),
            display_name: name.to_string(),
            description: None,
            route: format!("/{name}"),
            is_active: true,
            requires_approval: false,
        }
    }

    fn politica(explicitos: &[(&str, PermissionSet)], default: PermissionSet) -> RolePolicy {
        RolePolicy {
            code: "CONTADOR".into(),
            name: "Contador".into(),
            level: 3,
            description: None,
            modules: explicitos
                .iter()
                .map(|(m, s)| (m.to_string(), *s))
                .collect::<BTreeMap<_, _>>(),
            default,
        }
    }

    #[test]
    fn el_plan_cubre_cada_modulo_del_catalogo() {
        let catalog = vec![
            modulo(modulos::CONTABILIDAD),
            modulo(modulos::USUARIOS),
            modulo(modulos::TABLERO),
        ];
        let lectura = PermissionSet {
            can_read: true,
            ..Default::default()
        };
        let policy = politica(&[(modulos::CONTABILIDAD, lectura)], PermissionSet::default());

        let (plan, defaulted) = plan_grants(&catalog, &policy).unwrap();
        assert_eq!(plan.len(), catalog.len());
        assert!(plan.contains(&(modulos::CONTABILIDAD.to_string(), lectura)));
        // Los módulos no nombrados reciben el balde default y se reportan.
        assert_eq!(
            defaulted,
            vec![modulos::USUARIOS.to_string(), modulos::TABLERO.to_string()]
        );
        for m in &defaulted {
            assert!(plan.contains(&(m.clone(), PermissionSet::default())));
        }
    }

    #[test]
    fn modulo_fuera_del_catalogo_en_la_politica_es_error() {
        let catalog = vec![modulo(modulos::TABLERO)];
        let policy = politica(
            &[("nomina", PermissionSet::default())],
            PermissionSet::default(),
        );
        let err = plan_grants(&catalog, &policy).unwrap_err();
        assert!(matches!(err, AppError::ModuleNotFound(ref m) if m == "nomina"));
    }

    #[test]
    fn planear_dos_veces_da_el_mismo_plan() {
        let catalog = vec![modulo(modulos::CONTABILIDAD), modulo(modulos::REPORTES)];
        let policy = politica(
            &[(
                modulos::CONTABILIDAD,
                PermissionSet {
                    can_read: true,
                    can_update: true,
                    ..Default::default()
                },
            )],
            PermissionSet::default(),
        );
        let primero = plan_grants(&catalog, &policy).unwrap();
        let segundo = plan_grants(&catalog, &policy).unwrap();
        assert_eq!(primero, segundo);
    }
}
