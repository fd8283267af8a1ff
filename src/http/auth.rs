use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;

use crate::application::auth_service::AuthService;
use crate::domain::user::UserId;

use super::types::ApiError;

/// The authenticated caller, inserted into request extensions by
/// [`require_token`].
#[derive(Debug, Clone, Copy)]
pub struct Principal(pub UserId);

/// Resolves `Authorization: Token <key>` to a principal or rejects the
/// request with 401.
pub async fn require_token<A: AuthService + Clone>(
    State(auth): State<A>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            ApiError::Unauthorized("Authentication credentials were not provided".into())
        })?;
    let key = header
        .strip_prefix("Token ")
        .ok_or_else(|| ApiError::Unauthorized("Invalid token header".into()))?;
    let user = auth.authenticate(key.trim()).await?;
    req.extensions_mut().insert(Principal(user.id));
    Ok(next.run(req).await)
}
