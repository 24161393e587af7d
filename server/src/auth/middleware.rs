//! Authentication extractor.
//!
//! Bearer tokens are checked against the configured shared secret. Without a
//! secret the server runs open and the token, if any, names the caller.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
};

use crate::AppState;

/// Authenticated caller extracted from request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    /// Identity used when a save does not name its writer
    pub subject: String,
}

impl AuthUser {
    fn anonymous() -> Self {
        Self {
            subject: "anonymous".to_string(),
        }
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        match (auth_header, state.config.auth_secret.as_deref()) {
            (Some(header), secret) if header.starts_with("Bearer ") => {
                let token = header.trim_start_matches("Bearer ").trim();
                if token.is_empty() {
                    return Err((StatusCode::UNAUTHORIZED, "Empty bearer token"));
                }
                match secret {
                    Some(secret) if token != secret => {
                        tracing::warn!("Rejected request with invalid token");
                        Err((StatusCode::UNAUTHORIZED, "Invalid token"))
                    }
                    // never echo the shared secret as an identity
                    Some(_) => Ok(AuthUser {
                        subject: "authenticated".to_string(),
                    }),
                    None => Ok(AuthUser {
                        subject: token.to_string(),
                    }),
                }
            }
            (Some(_), _) => Err((
                StatusCode::UNAUTHORIZED,
                "Invalid authorization header format",
            )),
            (None, None) => Ok(AuthUser::anonymous()),
            (None, Some(_)) => Err((StatusCode::UNAUTHORIZED, "Missing authorization header")),
        }
    }
}
