use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::AppError;
use crate::state::AppState;
use crate::utils::jwt;

/// Authenticated participant extracted from the `Authorization: Bearer
/// <token>` header.
///
/// Token issuance lives in the identity service; this engine only verifies
/// claims and gates entry by role. Add this as a handler parameter to
/// require authentication.
pub struct AuthUser {
    pub user_id: i32,
    pub username: String,
    pub role: String,
}

impl AuthUser {
    pub fn is_teacher(&self) -> bool {
        self.role == "teacher"
    }

    /// Returns `Ok(())` for teachers, `Err(PermissionDenied)` otherwise.
    pub fn require_teacher(&self) -> Result<(), AppError> {
        if self.is_teacher() {
            Ok(())
        } else {
            Err(AppError::PermissionDenied)
        }
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::TokenMissing)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AppError::TokenInvalid)?;

        let claims = jwt::verify(&state.config.auth.jwt_secret, token)
            .map_err(|_| AppError::TokenInvalid)?;

        Ok(AuthUser {
            user_id: claims.uid,
            username: claims.sub,
            role: claims.role,
        })
    }
}
