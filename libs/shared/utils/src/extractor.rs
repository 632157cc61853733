use axum::{
    body::Body,
    http::{header::AUTHORIZATION, Request},
    middleware::Next,
    response::Response,
};

use shared_models::auth::AuthToken;
use shared_models::error::AppError;

/// Requires a bearer token and stores it in the request extensions.
pub async fn auth_middleware(mut request: Request<Body>, next: Next) -> Result<Response, AppError> {
    let token = bearer_token(&request)?;
    request.extensions_mut().insert(token);
    Ok(next.run(request).await)
}

fn bearer_token<B>(request: &Request<B>) -> Result<AuthToken, AppError> {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .ok_or_else(|| AppError::Auth("Missing authorization header".to_string()))?;

    let auth_value = auth_header
        .to_str()
        .map_err(|_| AppError::Auth("Invalid authorization header format".to_string()))?;

    let token = auth_value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Auth("Invalid authorization header format".to_string()))?;

    Ok(AuthToken::new(token))
}

pub fn extract_token<B>(request: &Request<B>) -> Result<AuthToken, AppError> {
    request
        .extensions()
        .get::<AuthToken>()
        .cloned()
        .ok_or_else(|| AppError::Auth("Token not found in request extensions".to_string()))
}
