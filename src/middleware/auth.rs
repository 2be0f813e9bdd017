// src/middleware/auth.rs

use axum::{
    extract::{FromRequestParts, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
    typed_header::TypedHeaderRejection,
};

use crate::{common::error::AppError, config::AppState, models::auth::User};

// Middleware de autenticación: valida el Bearer token y deja el usuario en
// los extensions de la petición. Un header ausente o malformado es un 401,
// igual que un token inválido.
pub async fn auth_guard(
    State(app_state): State<AppState>,
    bearer: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    mut request: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    let TypedHeader(bearer) = bearer.map_err(|_| AppError::InvalidToken)?;
    let user = app_state.auth_service.validate_token(bearer.token()).await?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

// Extractor para obtener el usuario autenticado directamente en los handlers
pub struct AuthenticatedUser(pub User);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<User>()
            .cloned()
            .map(AuthenticatedUser)
            .ok_or(AppError::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode, header};
    use axum::response::IntoResponse;

    type BearerResult = Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>;

    async fn extraer(request: Request<()>) -> BearerResult {
        let (mut parts, _) = request.into_parts();
        // El extractor Result nunca rechaza: el error queda adentro.
        <BearerResult as FromRequestParts<()>>::from_request_parts(&mut parts, &())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn header_ausente_termina_en_401() {
        let request = Request::builder().uri("/api/yo").body(()).unwrap();
        let error = extraer(request)
            .await
            .map_err(|_| AppError::InvalidToken)
            .unwrap_err();
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn header_malformado_termina_en_401() {
        let request = Request::builder()
            .uri("/api/yo")
            .header(header::AUTHORIZATION, "Basic abc123")
            .body(())
            .unwrap();
        let error = extraer(request)
            .await
            .map_err(|_| AppError::InvalidToken)
            .unwrap_err();
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn header_bearer_bien_formado_se_extrae() {
        let request = Request::builder()
            .uri("/api/yo")
            .header(header::AUTHORIZATION, "Bearer un-token")
            .body(())
            .unwrap();
        let TypedHeader(bearer) = extraer(request).await.unwrap();
        assert_eq!(bearer.token(), "un-token");
    }
}
