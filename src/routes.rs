// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method},
    middleware,
    routing::{get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{auth, quizzes, results, users},
    state::AppState,
    utils::jwt::auth_middleware,
};

/// Assembles the main application router.
///
/// * Public routes: login, registration, the quiz feed and detail, and the
///   guest result endpoints. They never pass through the access gate.
/// * Protected routes are merged in behind `auth_middleware`.
/// * Global middleware: request tracing and CORS from the configured
///   origins.
pub fn create_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let auth_routes = Router::new().route("/login", post(auth::login));

    let user_routes = Router::new()
        .route("/", post(users::register))
        .merge(
            Router::new()
                .route("/", get(users::list_users))
                .route("/{id}", get(users::get_user).delete(users::delete_user))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth_middleware,
                )),
        );

    let quiz_routes = Router::new()
        .route("/", get(quizzes::list_quizzes))
        .route("/{id}", get(quizzes::get_quiz))
        .merge(
            Router::new()
                .route("/", post(quizzes::create_quiz))
                .route("/user-quizzes", get(quizzes::list_user_quizzes))
                .route("/user-quizzes/{id}", get(quizzes::get_user_quiz))
                .route(
                    "/{id}",
                    put(quizzes::update_quiz).delete(quizzes::delete_quiz),
                )
                .route("/{id}/submit", post(results::submit_quiz))
                .route("/{id}/score", get(results::get_my_score))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth_middleware,
                )),
        );

    let result_routes = Router::new().route(
        "/",
        post(results::record_guest_score).get(results::get_guest_score),
    );

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/users", user_routes)
        .nest("/api/quizzes", quiz_routes)
        .nest("/api/results", result_routes)
        // Global middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
