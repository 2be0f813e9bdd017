// src/services/rbac_service.rs
//
// El evaluador de permisos: responde "¿puede el rol R ejecutar la acción A
// sobre el módulo M?" con un booleano determinista, y arma las vistas
// agregadas (menú, matriz) para la UI. Es una consulta pura sobre la tabla
// de grants; el único estado propio es un caché por proceso que se invalida
// de forma síncrona en cada escritura.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::common::error::AppError;
use crate::db::RbacRepository;
use crate::models::rbac::{
    Action, CreateRolePayload, IntegrityReport, PermissionGrant, PermissionSet, Role, RoleMatrix,
    SystemModule, UpdateRolePayload,
};

/// Foto inmutable de un rol con sus grants, indexados por módulo.
#[derive(Debug)]
pub struct GrantSnapshot {
    pub role: Role,
    grants: HashMap<String, PermissionSet>,
}

impl GrantSnapshot {
    /// Construye la foto detectando duplicados: dos registros para el mismo
    /// (rol, módulo) son un dato corrupto y se reportan, no se disimulan.
    pub fn from_rows(role: Role, rows: Vec<PermissionGrant>) -> Result<Self, AppError> {
        let mut grants = HashMap::with_capacity(rows.len());
        for row in rows {
            if grants.insert(row.module_name.clone(), row.permissions).is_some() {
                return Err(AppError::DuplicateGrant {
                    role_id: role.id,
                    module_name: row.module_name,
                });
            }
        }
        Ok(Self { role, grants })
    }

    /// Semántica central: rol inactivo niega todo; sin registro para el
    /// módulo no hay permiso alguno (deny-by-default); con registro, manda
    /// el booleano de la acción.
    pub fn can(&self, module: &str, action: Action) -> bool {
        if !self.role.is_active {
            return false;
        }
        self.grants
            .get(module)
            .map(|set| set.allows(action))
            .unwrap_or(false)
    }

    pub fn permissions_for(&self, module: &str) -> PermissionSet {
        self.grants.get(module).copied().unwrap_or_default()
    }
}

/// Veredicto autoritativo para una entrada del catálogo: un módulo apagado
/// niega para todos los roles, y sin rol (usuario en la cola de espera) la
/// respuesta es siempre `false`.
pub fn evaluate(module: &SystemModule, snapshot: Option<&GrantSnapshot>, action: Action) -> bool {
    if !module.is_active {
        return false;
    }
    match snapshot {
        Some(snapshot) => snapshot.can(&module.name, action),
        None => false,
    }
}

/// Módulos que el rol puede al menos leer. El interruptor del módulo manda
/// sobre el grant: un módulo apagado no aparece aunque el rol tenga
/// `can_read`. Sin rol, el conjunto es vacío.
pub fn accessible_modules(
    catalog: &[SystemModule],
    snapshot: Option<&GrantSnapshot>,
) -> BTreeSet<String> {
    catalog
        .iter()
        .filter(|m| evaluate(m, snapshot, Action::Read))
        .map(|m| m.name.clone())
        .collect()
}

/// Vista 2D completa para la pantalla de administración: una entrada por
/// cada módulo activo del catálogo, todo en falso donde no hay grant.
pub fn summarize_modules(
    catalog: &[SystemModule],
    snapshot: &GrantSnapshot,
) -> BTreeMap<String, PermissionSet> {
    catalog
        .iter()
        .filter(|m| m.is_active)
        .map(|m| (m.name.clone(), snapshot.permissions_for(&m.name)))
        .collect()
}

/// Caché por proceso con contador de generación. Cada invalidación sube la
/// generación; una foto cargada bajo una generación anterior no se guarda,
/// porque pudo haberse leído antes de la escritura que invalidó.
#[derive(Default)]
struct SnapshotCache {
    roles: HashMap<Uuid, Arc<GrantSnapshot>>,
    catalog: Option<Arc<Vec<SystemModule>>>,
    generation: u64,
}

impl SnapshotCache {
    fn invalidate_role(&mut self, role_id: Uuid) {
        self.generation += 1;
        self.roles.remove(&role_id);
    }

    fn invalidate_catalog(&mut self) {
        self.generation += 1;
        self.catalog = None;
    }

    /// Guarda la foto solo si nadie invalidó desde que se observó
    /// `observed`. Devuelve si quedó cacheada.
    fn store_role(&mut self, observed: u64, role_id: Uuid, snapshot: Arc<GrantSnapshot>) -> bool {
        if self.generation != observed {
            return false;
        }
        self.roles.insert(role_id, snapshot);
        true
    }

    fn store_catalog(&mut self, observed: u64, catalog: Arc<Vec<SystemModule>>) -> bool {
        if self.generation != observed {
            return false;
        }
        self.catalog = Some(catalog);
        true
    }
}

#[derive(Clone)]
pub struct RbacService {
    repo: RbacRepository,
    cache: Arc<RwLock<SnapshotCache>>,
}

impl RbacService {
    pub fn new(repo: RbacRepository) -> Self {
        Self {
            repo,
            cache: Arc::new(RwLock::new(SnapshotCache::default())),
        }
    }

    // --- Lecturas (con caché) ---

    async fn catalog(&self) -> Result<Arc<Vec<SystemModule>>, AppError> {
        let observed = {
            let cache = self.cache.read().await;
            if let Some(catalog) = &cache.catalog {
                return Ok(catalog.clone());
            }
            cache.generation
        };
        let catalog = Arc::new(self.repo.list_modules().await?);
        // Si hubo una invalidación entre la carga y el guardado, esta foto
        // puede ser anterior a la escritura: se responde pero no se cachea.
        self.cache
            .write()
            .await
            .store_catalog(observed, catalog.clone());
        Ok(catalog)
    }

    async fn snapshot(&self, role_id: Uuid) -> Result<Arc<GrantSnapshot>, AppError> {
        let observed = {
            let cache = self.cache.read().await;
            if let Some(snapshot) = cache.roles.get(&role_id) {
                return Ok(snapshot.clone());
            }
            cache.generation
        };
        // Un role_id que no existe no es un deny: es un dato roto que debe
        // verse (el FK de users lo vuelve prácticamente imposible).
        let role = self
            .repo
            .find_role(role_id)
            .await?
            .ok_or(AppError::RoleNotFound)?;
        let rows = self.repo.grants_for_role(role_id).await?;
        let snapshot = Arc::new(GrantSnapshot::from_rows(role, rows)?);
        self.cache
            .write()
            .await
            .store_role(observed, role_id, snapshot.clone());
        Ok(snapshot)
    }

    /// ¿Puede el rol ejecutar la acción sobre el módulo? Sin rol la
    /// respuesta es siempre `false`; un módulo fuera del catálogo es error
    /// del llamador, nunca un deny silencioso.
    pub async fn can(
        &self,
        role_id: Option<Uuid>,
        module: &str,
        action: Action,
    ) -> Result<bool, AppError> {
        let catalog = self.catalog().await?;
        let entry = catalog
            .iter()
            .find(|m| m.name == module)
            .ok_or_else(|| AppError::ModuleNotFound(module.to_string()))?;

        // El interruptor del módulo también manda en el check autoritativo
        // del servidor, no solo en el menú; con el módulo apagado ni siquiera
        // hace falta cargar los grants.
        if !entry.is_active {
            return Ok(false);
        }

        let snapshot = match role_id {
            Some(id) => Some(self.snapshot(id).await?),
            None => None,
        };
        Ok(evaluate(entry, snapshot.as_deref(), action))
    }

    pub async fn accessible_modules(
        &self,
        role_id: Option<Uuid>,
    ) -> Result<BTreeSet<String>, AppError> {
        let catalog = self.catalog().await?;
        let snapshot = match role_id {
            Some(id) => Some(self.snapshot(id).await?),
            None => None,
        };
        Ok(accessible_modules(&catalog, snapshot.as_deref()))
    }

    pub async fn summarize(&self, role_id: Uuid) -> Result<RoleMatrix, AppError> {
        let catalog = self.catalog().await?;
        let snapshot = self.snapshot(role_id).await?;
        Ok(RoleMatrix {
            role: snapshot.role.clone(),
            modules: summarize_modules(&catalog, &snapshot),
        })
    }

    pub async fn list_roles(&self) -> Result<Vec<Role>, AppError> {
        self.repo.list_roles().await
    }

    pub async fn find_role(&self, role_id: Uuid) -> Result<Option<Role>, AppError> {
        self.repo.find_role(role_id).await
    }

    pub async fn list_modules(&self) -> Result<Vec<SystemModule>, AppError> {
        Ok(self.catalog().await?.as_ref().clone())
    }

    // --- Escrituras (invalidan el caché antes de responder) ---

    pub async fn create_role(&self, payload: CreateRolePayload) -> Result<Role, AppError> {
        self.repo
            .create_role(
                &payload.code,
                &payload.name,
                payload.level,
                payload.description.as_deref(),
            )
            .await
    }

    pub async fn update_role(
        &self,
        role_id: Uuid,
        payload: UpdateRolePayload,
    ) -> Result<Role, AppError> {
        let role = self
            .repo
            .update_role(role_id, &payload)
            .await?
            .ok_or(AppError::RoleNotFound)?;
        self.invalidate_role(role_id).await;
        Ok(role)
    }

    pub async fn update_grant(
        &self,
        role_id: Uuid,
        module: &str,
        set: PermissionSet,
    ) -> Result<PermissionGrant, AppError> {
        // Valida contra el catálogo antes de escribir: un grant hacia un
        // módulo inexistente es un error de configuración.
        let catalog = self.catalog().await?;
        if !catalog.iter().any(|m| m.name == module) {
            return Err(AppError::ModuleNotFound(module.to_string()));
        }
        if self.repo.find_role(role_id).await?.is_none() {
            return Err(AppError::RoleNotFound);
        }

        let grant = self.repo.upsert_grant(role_id, module, set).await?;
        self.invalidate_role(role_id).await;
        Ok(grant)
    }

    pub async fn set_module_active(
        &self,
        name: &str,
        is_active: bool,
    ) -> Result<SystemModule, AppError> {
        let module = self
            .repo
            .set_module_active(name, is_active)
            .await?
            .ok_or_else(|| AppError::ModuleNotFound(name.to_string()))?;
        self.invalidate_catalog().await;
        tracing::info!(modulo = %name, activo = is_active, "Interruptor de módulo actualizado");
        Ok(module)
    }

    pub async fn verify_integrity(&self) -> Result<IntegrityReport, AppError> {
        Ok(IntegrityReport {
            duplicate_grants: self.repo.duplicate_grants().await?,
            orphan_modules: self.repo.orphan_grant_modules().await?,
        })
    }

    // --- Invalidación ---
    //
    // Ninguna mutación de permisos se considera completa hasta haber
    // invalidado el caché de los roles afectados: no hay ventana de caché
    // viejo más allá de la propia llamada de escritura.

    pub async fn invalidate_role(&self, role_id: Uuid) {
        self.cache.write().await.invalidate_role(role_id);
    }

    pub async fn invalidate_catalog(&self) {
        self.cache.write().await.invalidate_catalog();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::rbac::modulos;

    fn rol(code: &str, is_active: bool) -> Role {
        Role {
            id: Uuid::new_v4(),
            code: code.to_string(),
            name: code.to_string(),
            level: 3,
            description: None,
            is_active,
            created_at: None,
            updated_at: None,
        }
    }

    fn modulo(name: &str, is_active: bool) -> SystemModule {
        SystemModule {
            name: name.to_string(),
            display_name: name.to_string(),
            description: None,
            route: format!("/{name}"),
            is_active,
            requires_approval: false,
        }
    }

    fn grant(role_id: Uuid, module: &str, set: PermissionSet) -> PermissionGrant {
        PermissionGrant {
            role_id,
            module_name: module.to_string(),
            permissions: set,
        }
    }

    #[test]
    fn sin_registro_se_niega_todo() {
        let snapshot = GrantSnapshot::from_rows(rol("INVITADO", true), vec![]).unwrap();
        for action in Action::ALL {
            assert!(!snapshot.can(modulos::USUARIOS, action));
        }
    }

    #[test]
    fn rol_inactivo_niega_aunque_el_grant_diga_que_si() {
        let role = rol("CONTADOR", false);
        let rows = vec![grant(
            role.id,
            modulos::CONTABILIDAD,
            PermissionSet {
                can_read: true,
                can_update: true,
                ..Default::default()
            },
        )];
        let snapshot = GrantSnapshot::from_rows(role, rows).unwrap();
        assert!(!snapshot.can(modulos::CONTABILIDAD, Action::Read));
        assert!(!snapshot.can(modulos::CONTABILIDAD, Action::Update));
    }

    #[test]
    fn el_grant_responde_accion_por_accion() {
        // Escenario Contador: contabilidad con read/create/update/export,
        // sin delete.
        let role = rol("CONTADOR", true);
        let rows = vec![grant(
            role.id,
            modulos::CONTABILIDAD,
            PermissionSet {
                can_read: true,
                can_create: true,
                can_update: true,
                can_export: true,
                ..Default::default()
            },
        )];
        let snapshot = GrantSnapshot::from_rows(role, rows).unwrap();

        assert!(snapshot.can(modulos::CONTABILIDAD, Action::Update));
        assert!(snapshot.can(modulos::CONTABILIDAD, Action::Export));
        assert!(!snapshot.can(modulos::CONTABILIDAD, Action::Delete));
        assert!(!snapshot.can(modulos::CONTABILIDAD, Action::Approve));
        // Otro módulo sin registro: nada.
        assert!(!snapshot.can(modulos::USUARIOS, Action::Read));
    }

    #[test]
    fn duplicado_en_la_tabla_es_error_no_deny() {
        let role = rol("OPERADOR", true);
        let rows = vec![
            grant(role.id, modulos::TABLERO, PermissionSet::default()),
            grant(
                role.id,
                modulos::TABLERO,
                PermissionSet {
                    can_read: true,
                    ..Default::default()
                },
            ),
        ];
        let err = GrantSnapshot::from_rows(role, rows).unwrap_err();
        assert!(matches!(
            err,
            AppError::DuplicateGrant { ref module_name, .. } if module_name == modulos::TABLERO
        ));
    }

    #[test]
    fn menu_sin_rol_es_vacio() {
        let catalog = vec![modulo(modulos::TABLERO, true), modulo(modulos::USUARIOS, true)];
        assert!(accessible_modules(&catalog, None).is_empty());
    }

    #[test]
    fn modulo_apagado_no_aparece_en_el_menu_aunque_haya_grant() {
        let role = rol("OPERADOR", true);
        let leer = PermissionSet {
            can_read: true,
            ..Default::default()
        };
        let rows = vec![
            grant(role.id, modulos::TABLERO, leer),
            grant(role.id, modulos::PROYECTOS, leer),
        ];
        let snapshot = GrantSnapshot::from_rows(role, rows).unwrap();
        let catalog = vec![
            modulo(modulos::TABLERO, false), // apagado
            modulo(modulos::PROYECTOS, true),
            modulo(modulos::USUARIOS, true),
        ];

        let menu = accessible_modules(&catalog, Some(&snapshot));
        assert!(!menu.contains(modulos::TABLERO));
        assert!(menu.contains(modulos::PROYECTOS));
        // Sin can_read tampoco aparece.
        assert!(!menu.contains(modulos::USUARIOS));
    }

    #[test]
    fn escenario_invitado_sin_grant_de_usuarios() {
        let role = rol("INVITADO", true);
        let rows = vec![grant(
            role.id,
            modulos::TABLERO,
            PermissionSet {
                can_read: true,
                ..Default::default()
            },
        )];
        let snapshot = GrantSnapshot::from_rows(role, rows).unwrap();
        let catalog = vec![modulo(modulos::TABLERO, true), modulo(modulos::USUARIOS, true)];

        assert!(!snapshot.can(modulos::USUARIOS, Action::Read));
        let menu = accessible_modules(&catalog, Some(&snapshot));
        assert!(!menu.contains(modulos::USUARIOS));
        assert!(menu.contains(modulos::TABLERO));
    }

    #[test]
    fn la_matriz_incluye_todos_los_modulos_activos_y_solo_esos() {
        let role = rol("CONTADOR", true);
        let rows = vec![grant(
            role.id,
            modulos::CONTABILIDAD,
            PermissionSet {
                can_read: true,
                ..Default::default()
            },
        )];
        let snapshot = GrantSnapshot::from_rows(role, rows).unwrap();
        let catalog = vec![
            modulo(modulos::CONTABILIDAD, true),
            modulo(modulos::USUARIOS, true),
            modulo(modulos::AUDITORIA, false), // apagado: fuera de la matriz
        ];

        let matriz = summarize_modules(&catalog, &snapshot);
        assert_eq!(matriz.len(), 2);
        // El módulo sin grant aparece con todo en falso, no se omite.
        assert_eq!(
            matriz.get(modulos::USUARIOS),
            Some(&PermissionSet::default())
        );
        assert!(matriz.get(modulos::CONTABILIDAD).unwrap().can_read);
        assert!(!matriz.contains_key(modulos::AUDITORIA));
    }

    #[test]
    fn sin_rol_se_niega_cada_accion_aunque_el_modulo_este_activo() {
        let entry = modulo(modulos::TABLERO, true);
        for action in Action::ALL {
            assert!(!evaluate(&entry, None, action));
        }
    }

    #[test]
    fn evaluate_respeta_el_interruptor_y_el_grant() {
        let role = rol("OPERADOR", true);
        let rows = vec![grant(
            role.id,
            modulos::TABLERO,
            PermissionSet {
                can_read: true,
                ..Default::default()
            },
        )];
        let snapshot = GrantSnapshot::from_rows(role, rows).unwrap();

        let encendido = modulo(modulos::TABLERO, true);
        assert!(evaluate(&encendido, Some(&snapshot), Action::Read));
        assert!(!evaluate(&encendido, Some(&snapshot), Action::Delete));

        let apagado = modulo(modulos::TABLERO, false);
        assert!(!evaluate(&apagado, Some(&snapshot), Action::Read));
    }

    #[test]
    fn una_invalidacion_intermedia_rechaza_la_foto_de_rol_cargada_antes() {
        // Un lector observa la generación, carga de la base, y mientras
        // tanto una escritura invalida el rol: esa foto ya no entra.
        let mut cache = SnapshotCache::default();
        let role = rol("CONTADOR", true);
        let role_id = role.id;
        let observed = cache.generation;

        cache.invalidate_role(role_id);

        let vieja = Arc::new(GrantSnapshot::from_rows(role, vec![]).unwrap());
        assert!(!cache.store_role(observed, role_id, vieja));
        assert!(!cache.roles.contains_key(&role_id));

        // Con la generación vigente, la recarga sí queda cacheada.
        let fresca = Arc::new(GrantSnapshot::from_rows(rol("CONTADOR", true), vec![]).unwrap());
        assert!(cache.store_role(cache.generation, role_id, fresca));
        assert!(cache.roles.contains_key(&role_id));
    }

    #[test]
    fn una_invalidacion_intermedia_rechaza_el_catalogo_cargado_antes() {
        let mut cache = SnapshotCache::default();
        let observed = cache.generation;

        cache.invalidate_catalog();

        let viejo = Arc::new(vec![modulo(modulos::TABLERO, true)]);
        assert!(!cache.store_catalog(observed, viejo));
        assert!(cache.catalog.is_none());

        let fresco = Arc::new(vec![modulo(modulos::TABLERO, false)]);
        assert!(cache.store_catalog(cache.generation, fresco));
        assert!(cache.catalog.is_some());
    }

    #[test]
    fn invalidar_un_rol_tambien_corta_el_guardado_del_catalogo_y_viceversa() {
        // El contador es global: cualquier escritura entre la carga y el
        // guardado descarta la foto, sin importar qué entrada tocó.
        let mut cache = SnapshotCache::default();
        let observed = cache.generation;

        cache.invalidate_role(Uuid::new_v4());

        let catalogo = Arc::new(vec![modulo(modulos::USUARIOS, true)]);
        assert!(!cache.store_catalog(observed, catalogo));
    }
}
