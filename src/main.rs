// src/main.rs

use axum::{
    Router,
    middleware as axum_middleware,
    routing::{get, patch, post, put},
};
use tokio::net::TcpListener;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod common;
mod config;
mod db;
mod docs;
mod handlers;
mod middleware;
mod models;
mod services;

use crate::config::AppState;
use crate::middleware::auth::auth_guard;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_target(false).compact().init();

    // Si la configuración falla, la aplicación no debe arrancar.
    let app_state = AppState::new()
        .await
        .expect("Falla al inicializar el estado de la aplicación.");

    sqlx::migrate!()
        .run(&app_state.db_pool)
        .await
        .expect("Falla al correr las migraciones de la base de datos.");

    tracing::info!("✅ Migraciones de la base de datos ejecutadas");

    // Siembra de los roles de fábrica desde la tabla de políticas embebida.
    // Modo skip-existing: nunca pisa lo que un administrador ya ajustó.
    if AppState::seed_enabled() {
        let reports = app_state
            .provision_service
            .provision_defaults()
            .await
            .expect("Falla al aprovisionar los roles de fábrica.");
        tracing::info!(roles = reports.len(), "✅ Roles de fábrica aprovisionados");
    }

    // Rutas públicas de autenticación
    let auth_routes = Router::new()
        .route("/register", post(handlers::auth::register))
        .route("/login", post(handlers::auth::login));

    // Rutas de sesión (protegidas por el middleware de auth)
    let me_routes = Router::new()
        .route("/me", get(handlers::auth::get_me))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            auth_guard,
        ));

    // Administración de roles y permisos. Los guards por módulo/acción van
    // en cada handler; aquí solo se exige sesión.
    let rbac_routes = Router::new()
        .route(
            "/roles",
            get(handlers::rbac::list_roles).post(handlers::rbac::create_role),
        )
        .route("/roles/{id}", patch(handlers::rbac::update_role))
        .route("/roles/{id}/permisos", get(handlers::rbac::role_matrix))
        .route(
            "/roles/{id}/permisos/{modulo}",
            put(handlers::rbac::update_grant),
        )
        .route(
            "/roles/{id}/aprovisionar",
            post(handlers::rbac::provision_role),
        )
        .route("/modulos", get(handlers::rbac::list_modules))
        .route("/modulos/{nombre}", patch(handlers::rbac::toggle_module))
        .route("/menu", get(handlers::rbac::my_menu))
        .route(
            "/permisos/verificar",
            get(handlers::rbac::check_permission),
        )
        .route("/permisos/integridad", get(handlers::rbac::check_integrity))
        .route("/usuarios/sin-rol", get(handlers::usuarios::users_without_role))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            auth_guard,
        ));

    let app = Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .nest("/api/auth", auth_routes)
        .nest("/api/auth", me_routes)
        .nest("/api", rbac_routes)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", docs::ApiDoc::openapi()))
        .with_state(app_state);

    let addr = "0.0.0.0:3000";
    let listener = TcpListener::bind(addr)
        .await
        .expect("Falla al iniciar el listener TCP");
    tracing::info!("🚀 Servidor escuchando en {}", addr);
    axum::serve(listener, app).await.expect("Error en el servidor Axum");
}
