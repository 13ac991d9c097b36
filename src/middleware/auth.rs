use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use mongodb::bson::{doc, oid::ObjectId};

use crate::errors::{AppError, Result};
use crate::models::user::{self, Role, User};
use crate::services::token_service;
use crate::state::AppState;

/// The authenticated caller, loaded fresh from the database on every request.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl AuthUser {
    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    pub fn role(&self) -> Role {
        self.0.role
    }

    pub fn is_admin(&self) -> bool {
        self.0.role == Role::Admin
    }

    pub fn require_role(&self, allowed: &[Role]) -> Result<()> {
        if allowed.contains(&self.0.role) {
            Ok(())
        } else {
            Err(AppError::forbidden(format!(
                "User role {} is not authorized to access this route",
                self.0.role.as_str()
            )))
        }
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| AppError::AuthError("missing bearer token".into()))?;

        let claims = token_service::verify(token, &state.config.jwt_secret)?;
        let user_id = ObjectId::parse_str(&claims.sub)
            .map_err(|_| AppError::AuthError("malformed subject".into()))?;

        let user = state
            .db
            .collection::<User>(user::COLLECTION)
            .find_one(doc! { "_id": user_id })
            .await?
            .ok_or_else(|| AppError::AuthError("user no longer exists".into()))?;

        Ok(AuthUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn extracts_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));
    }

    #[test]
    fn role_check_is_forbidden_on_mismatch() {
        let user = AuthUser(User::new(
            "Sami".into(),
            "sami@example.com".into(),
            "hash".into(),
            Role::Student,
        ));
        assert!(user.require_role(&[Role::Student]).is_ok());
        let err = user.require_role(&[Role::Teacher, Role::Admin]).unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::FORBIDDEN);
    }
}
