use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

// Tipo de error de la aplicación, con `thiserror` para mejor ergonomía.
//
// Tres familias, con destinos distintos:
//  - denegación de autorización (Forbidden): resultado normal, 403;
//  - errores de configuración (UnknownAction, ModuleNotFound, InvalidPolicy):
//    bug del código llamador, fallan con ruido;
//  - violaciones de integridad (DuplicateGrant): dato corrupto, se
//    propagan hacia arriba, nunca se disimulan como un deny.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Error de validación")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("El correo ya existe")]
    EmailAlreadyExists,

    #[error("Credenciales inválidas")]
    InvalidCredentials,

    #[error("Token inválido")]
    InvalidToken,

    #[error("Rol no encontrado")]
    RoleNotFound,

    #[error("Sin permiso para '{modulo}:{accion}'")]
    Forbidden { modulo: String, accion: String },

    #[error("Acción desconocida: '{0}'")]
    UnknownAction(String),

    #[error("El módulo '{0}' no existe en el catálogo")]
    ModuleNotFound(String),

    #[error("Tabla de políticas inválida: {0}")]
    InvalidPolicy(String),

    #[error("Grant duplicado para el rol {role_id} y el módulo '{module_name}'")]
    DuplicateGrant {
        role_id: uuid::Uuid,
        module_name: String,
    },

    #[error("Violación de unicidad: {0}")]
    UniqueConstraintViolation(String),

    #[error("Error de base de datos")]
    DatabaseError(#[from] sqlx::Error),

    // Variante genérica para cualquier otro error inesperado.
    #[error("Error interno del servidor")]
    InternalServerError(#[from] anyhow::Error),

    #[error("Error de bcrypt: {0}")]
    BcryptError(#[from] bcrypt::BcryptError),

    #[error("Error de JWT: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            // Devuelve todos los detalles de la validación.
            AppError::ValidationError(errors) => {
                let mut details = std::collections::HashMap::new();
                for (field, field_errors) in errors.field_errors() {
                    let messages: Vec<String> = field_errors
                        .iter()
                        .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
                        .collect();
                    details.insert(field.to_string(), messages);
                }
                let body = Json(json!({
                    "error": "Uno o más campos son inválidos.",
                    "details": details,
                }));
                return (StatusCode::BAD_REQUEST, body).into_response();
            }
            AppError::EmailAlreadyExists => {
                (StatusCode::CONFLICT, "Este correo ya está en uso.".to_string())
            }
            AppError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "Correo o contraseña inválidos.".to_string(),
            ),
            AppError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "Token de autenticación inválido o ausente.".to_string(),
            ),
            AppError::RoleNotFound => {
                (StatusCode::NOT_FOUND, "Rol no encontrado.".to_string())
            }
            // La denegación es un resultado normal: 403 claro, nunca un crash.
            AppError::Forbidden { ref modulo, ref accion } => (
                StatusCode::FORBIDDEN,
                format!("Necesita el permiso '{modulo}:{accion}' para realizar esta acción."),
            ),
            // Errores de configuración: bug del llamador. Se registran con
            // ruido y regresan 400 para que nadie los confunda con un deny.
            AppError::UnknownAction(ref accion) => {
                tracing::error!("Acción desconocida solicitada al evaluador: '{accion}'");
                (StatusCode::BAD_REQUEST, format!("Acción desconocida: '{accion}'."))
            }
            AppError::ModuleNotFound(ref modulo) => {
                tracing::error!("Módulo fuera del catálogo solicitado: '{modulo}'");
                (
                    StatusCode::BAD_REQUEST,
                    format!("El módulo '{modulo}' no existe en el catálogo."),
                )
            }
            AppError::InvalidPolicy(ref detalle) => (
                StatusCode::BAD_REQUEST,
                format!("Tabla de políticas inválida: {detalle}."),
            ),
            AppError::UniqueConstraintViolation(ref msg) => {
                (StatusCode::CONFLICT, msg.clone())
            }

            // Integridad y todo lo demás (DatabaseError, InternalServerError)
            // se vuelven 500. `tracing` registra el detalle que nos dio
            // `thiserror`.
            ref e => {
                tracing::error!("Error interno del servidor: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Ocurrió un error inesperado.".to_string(),
                )
            }
        };

        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}
