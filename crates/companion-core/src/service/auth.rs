use axum::http::{header, HeaderMap};

use crate::db::{AuthedUser, Database};
use crate::error::AuthError;

/// Extract the bearer token from the Authorization header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingBearer)?;
    let token = value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .ok_or(AuthError::MissingBearer)?;
    if token.is_empty() {
        return Err(AuthError::MissingBearer);
    }
    Ok(token)
}

/// Resolve the caller's identity from the Authorization header.
///
/// The returned [`AuthedUser`] carries the caller's token, so every database
/// operation issued with it runs under that identity.
pub async fn authenticate(
    db: &dyn Database,
    headers: &HeaderMap,
) -> Result<AuthedUser, AuthError> {
    let token = bearer_token(headers)?;
    db.resolve_user(token).await
}
