//! Authentication middleware for Axum

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::error::ApiError;
use crate::state::AppState;

/// The authenticated admin, inserted as a request extension by
/// [`require_admin`].
#[derive(Debug, Clone)]
pub struct AdminUser {
    pub id: i64,
    pub email: String,
}

/// Reject requests without a valid admin JWT.
///
/// 401 for a missing/invalid credential, 403 for a valid token whose role is
/// not admin.
pub async fn require_admin(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))?;

    let claims = state.jwt.verify_token(token)?;

    if claims.role != "admin" {
        return Err(ApiError::Forbidden("Admin access required".to_string()));
    }

    request.extensions_mut().insert(AdminUser {
        id: claims.sub,
        email: claims.email,
    });

    Ok(next.run(request).await)
}
