use std::sync::Arc;

use axum::{
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
    body::Body,
};
use axum_extra::typed_header::{TypedHeader, TypedHeaderRejection};
use headers::{authorization::Bearer, Authorization};

use shared_models::auth::User;
use shared_models::error::AppError;
use shared_config::AppConfig;

use crate::jwt::validate_token;

// Validates the bearer token and makes the `User` available to handlers
pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    auth: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let TypedHeader(auth) = auth.map_err(|rejection| {
        if rejection.is_missing() {
            AppError::Auth("Missing authorization header".to_string())
        } else {
            AppError::Auth("Invalid authorization header format".to_string())
        }
    })?;

    let user = validate_token(auth.token(), &config.supabase_jwt_secret)
        .map_err(AppError::Auth)?;

    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

pub async fn extract_user<B>(request: &Request<B>) -> Result<User, AppError> {
    request
        .extensions()
        .get::<User>()
        .cloned()
        .ok_or_else(|| AppError::Auth("User not found in request extensions".to_string()))
}
