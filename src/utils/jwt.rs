// src/utils/jwt.rs

use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{config::Config, error::AppError};

/// JWT claims. Carries the identity the access gate attaches to requests.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Claims {
    /// Subject - the user ID (as string).
    pub sub: String,
    pub email: String,
    pub name: String,
    /// Expiration time as Unix timestamp.
    pub exp: usize,
}

impl Claims {
    pub fn user_id(&self) -> Result<i64, AppError> {
        self.sub
            .parse()
            .map_err(|_| AppError::AuthError("Invalid token subject".to_string()))
    }
}

/// Signs a new JWT carrying the user's id, email and name.
pub fn sign_jwt(
    id: i64,
    email: &str,
    name: &str,
    secret: &str,
    expiration_seconds: u64,
) -> Result<String, AppError> {
    let expiration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .as_secs() as usize
        + expiration_seconds as usize;

    let claims = Claims {
        sub: id.to_string(),
        email: email.to_owned(),
        name: name.to_owned(),
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalServerError(e.to_string()))
}

/// Verifies signature and expiry, returning the `Claims` when valid.
pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    let token_data = decode(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::AuthError("Invalid token".to_string()))?;

    Ok(token_data.claims)
}

/// Pulls the token out of an `Authorization` header value.
///
/// The value must split into exactly two whitespace-separated parts and the
/// scheme must be `bearer`, case-insensitively. Anything else is rejected.
pub fn extract_bearer_token(header_value: &str) -> Result<&str, AppError> {
    let parts: Vec<&str> = header_value.split_whitespace().collect();

    if parts.len() == 2 && parts[0].eq_ignore_ascii_case("bearer") {
        return Ok(parts[1]);
    }

    Err(AppError::AuthError("Malformed access token".to_string()))
}

/// Axum middleware: the access gate for protected routes.
///
/// Validates the `Authorization: Bearer <token>` header and injects the
/// decoded `Claims` into the request extensions for downstream handlers.
/// Public routes never pass through this middleware.
pub async fn auth_middleware(
    State(config): State<Config>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(AppError::AuthError("Missing access token".to_string()))?;

    let token = extract_bearer_token(auth_header)?;

    let claims = verify_jwt(token, &config.jwt_secret)?;
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}
