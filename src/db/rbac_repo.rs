// src/db/rbac_repo.rs

use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::common::error::AppError;
use crate::models::rbac::{PermissionGrant, PermissionSet, Role, SystemModule, UpdateRolePayload};

#[derive(Clone)]
pub struct RbacRepository {
    pool: PgPool,
}

impl RbacRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // --- Roles ---

    pub async fn find_role(&self, id: Uuid) -> Result<Option<Role>, AppError> {
        let role = sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(role)
    }

    pub async fn find_role_by_code(&self, code: &str) -> Result<Option<Role>, AppError> {
        let role = sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(role)
    }

    pub async fn list_roles(&self) -> Result<Vec<Role>, AppError> {
        let roles = sqlx::query_as::<_, Role>("SELECT * FROM roles ORDER BY level, name")
            .fetch_all(&self.pool)
            .await?;
        Ok(roles)
    }

    pub async fn create_role(
        &self,
        code: &str,
        name: &str,
        level: i32,
        description: Option<&str>,
    ) -> Result<Role, AppError> {
        sqlx::query_as::<_, Role>(
            r#"
            INSERT INTO roles (code, name, level, description)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(code)
        .bind(name)
        .bind(level)
        .bind(description)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let Some(db_err) = e.as_database_error() {
                if db_err.is_unique_violation() {
                    return AppError::UniqueConstraintViolation(
                        "Ya existe un rol con ese código o nombre.".into(),
                    );
                }
            }
            e.into()
        })
    }

    pub async fn update_role(
        &self,
        id: Uuid,
        payload: &UpdateRolePayload,
    ) -> Result<Option<Role>, AppError> {
        let role = sqlx::query_as::<_, Role>(
            r#"
            UPDATE roles SET
                name = COALESCE($2, name),
                level = COALESCE($3, level),
                description = COALESCE($4, description),
                is_active = COALESCE($5, is_active),
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(payload.name.as_deref())
        .bind(payload.level)
        .bind(payload.description.as_deref())
        .bind(payload.is_active)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            if let Some(db_err) = e.as_database_error() {
                if db_err.is_unique_violation() {
                    return AppError::UniqueConstraintViolation(
                        "Ya existe un rol con ese nombre.".into(),
                    );
                }
            }
            e.into()
        })?;
        Ok(role)
    }

    // --- Catálogo de módulos ---

    pub async fn list_modules(&self) -> Result<Vec<SystemModule>, AppError> {
        let modules =
            sqlx::query_as::<_, SystemModule>("SELECT * FROM system_modules ORDER BY name")
                .fetch_all(&self.pool)
                .await?;
        Ok(modules)
    }

    pub async fn set_module_active(
        &self,
        name: &str,
        is_active: bool,
    ) -> Result<Option<SystemModule>, AppError> {
        let module = sqlx::query_as::<_, SystemModule>(
            "UPDATE system_modules SET is_active = $2 WHERE name = $1 RETURNING *",
        )
        .bind(name)
        .bind(is_active)
        .fetch_optional(&self.pool)
        .await?;
        Ok(module)
    }

    // --- Grants ---

    pub async fn grants_for_role(&self, role_id: Uuid) -> Result<Vec<PermissionGrant>, AppError> {
        let grants = sqlx::query_as::<_, PermissionGrant>(
            "SELECT * FROM role_permissions WHERE role_id = $1 ORDER BY module_name",
        )
        .bind(role_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(grants)
    }

    pub async fn grant_modules_for_role<'e, E>(
        &self,
        executor: E,
        role_id: Uuid,
    ) -> Result<Vec<String>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT module_name FROM role_permissions WHERE role_id = $1",
        )
        .bind(role_id)
        .fetch_all(executor)
        .await?;
        Ok(rows.into_iter().map(|(m,)| m).collect())
    }

    pub async fn upsert_grant(
        &self,
        role_id: Uuid,
        module_name: &str,
        set: PermissionSet,
    ) -> Result<PermissionGrant, AppError> {
        let grant = sqlx::query_as::<_, PermissionGrant>(
            r#"
            INSERT INTO role_permissions
                (role_id, module_name, can_read, can_create, can_update, can_delete, can_export, can_approve)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (role_id, module_name) DO UPDATE SET
                can_read = EXCLUDED.can_read,
                can_create = EXCLUDED.can_create,
                can_update = EXCLUDED.can_update,
                can_delete = EXCLUDED.can_delete,
                can_export = EXCLUDED.can_export,
                can_approve = EXCLUDED.can_approve
            RETURNING *
            "#,
        )
        .bind(role_id)
        .bind(module_name)
        .bind(set.can_read)
        .bind(set.can_create)
        .bind(set.can_update)
        .bind(set.can_delete)
        .bind(set.can_export)
        .bind(set.can_approve)
        .fetch_one(&self.pool)
        .await?;
        Ok(grant)
    }

    /// Inserta un grant solo si el par (rol, módulo) no existe. Devuelve
    /// `true` si insertó algo.
    pub async fn insert_grant_skip<'e, E>(
        &self,
        executor: E,
        role_id: Uuid,
        module_name: &str,
        set: PermissionSet,
    ) -> Result<bool, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            r#"
            INSERT INTO role_permissions
                (role_id, module_name, can_read, can_create, can_update, can_delete, can_export, can_approve)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (role_id, module_name) DO NOTHING
            "#,
        )
        .bind(role_id)
        .bind(module_name)
        .bind(set.can_read)
        .bind(set.can_create)
        .bind(set.can_update)
        .bind(set.can_delete)
        .bind(set.can_export)
        .bind(set.can_approve)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Inserta o sobrescribe un grant dentro del executor dado.
    pub async fn insert_grant_overwrite<'e, E>(
        &self,
        executor: E,
        role_id: Uuid,
        module_name: &str,
        set: PermissionSet,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            INSERT INTO role_permissions
                (role_id, module_name, can_read, can_create, can_update, can_delete, can_export, can_approve)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (role_id, module_name) DO UPDATE SET
                can_read = EXCLUDED.can_read,
                can_create = EXCLUDED.can_create,
                can_update = EXCLUDED.can_update,
                can_delete = EXCLUDED.can_delete,
                can_export = EXCLUDED.can_export,
                can_approve = EXCLUDED.can_approve
            "#,
        )
        .bind(role_id)
        .bind(module_name)
        .bind(set.can_read)
        .bind(set.can_create)
        .bind(set.can_update)
        .bind(set.can_delete)
        .bind(set.can_export)
        .bind(set.can_approve)
        .execute(executor)
        .await?;
        Ok(())
    }

    // --- Revisión de consistencia ---

    /// Pares (rol, módulo) con más de un registro. La llave primaria lo
    /// impide; la consulta existe como cinturón para datos importados.
    pub async fn duplicate_grants(&self) -> Result<Vec<PermissionGrant>, AppError> {
        let grants = sqlx::query_as::<_, PermissionGrant>(
            r#"
            SELECT role_id, module_name,
                   bool_or(can_read)    AS can_read,
                   bool_or(can_create)  AS can_create,
                   bool_or(can_update)  AS can_update,
                   bool_or(can_delete)  AS can_delete,
                   bool_or(can_export)  AS can_export,
                   bool_or(can_approve) AS can_approve
            FROM role_permissions
            GROUP BY role_id, module_name
            HAVING COUNT(*) > 1
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(grants)
    }

    /// Grants que referencian módulos fuera del catálogo.
    pub async fn orphan_grant_modules(&self) -> Result<Vec<String>, AppError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT rp.module_name
            FROM role_permissions rp
            LEFT JOIN system_modules m ON m.name = rp.module_name
            WHERE m.name IS NULL
            ORDER BY rp.module_name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(m,)| m).collect())
    }
}
