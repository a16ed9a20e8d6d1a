use axum::{extract::FromRequestParts, http::header};
use sea_orm::EntityTrait;
use uuid::Uuid;

use crate::{
    entity::Users,
    error::AppError,
    models::Role,
    services::auth_service::decode_access_token,
    state::AppState,
};

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: Role,
}

pub fn ensure_role(user: &AuthUser, role: Role) -> Result<(), AppError> {
    if user.role != role {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

pub fn ensure_admin(user: &AuthUser) -> Result<(), AppError> {
    ensure_role(user, Role::Admin)
}

pub fn bearer_token(value: &str) -> Result<&str, AppError> {
    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Invalid Authorization scheme".into()))
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".into()))?;

        let auth_str = auth_header
            .to_str()
            .map_err(|_| AppError::Unauthorized("Invalid Authorization header".into()))?;
        let token = bearer_token(auth_str)?;

        let claims = decode_access_token(&state.config.jwt_secret, token)?;
        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AppError::Unauthorized("Invalid user id in token".into()))?;

        // Reload so role changes and deletions apply before the token expires.
        let user = Users::find_by_id(user_id)
            .one(&state.orm)
            .await?
            .filter(|u| !u.is_deleted)
            .ok_or_else(|| AppError::Unauthorized("Invalid Access Token".into()))?;

        let role = user
            .role
            .parse::<Role>()
            .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;

        Ok(AuthUser {
            user_id: user.id,
            role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_requires_scheme_and_value() {
        assert_eq!(bearer_token("Bearer abc.def").unwrap(), "abc.def");
        assert!(bearer_token("Basic abc").is_err());
        assert!(bearer_token("Bearer   ").is_err());
    }

    #[test]
    fn ensure_admin_rejects_other_roles() {
        let seller = AuthUser {
            user_id: Uuid::new_v4(),
            role: Role::Seller,
        };
        assert!(matches!(ensure_admin(&seller), Err(AppError::Forbidden)));
        let admin = AuthUser {
            user_id: Uuid::new_v4(),
            role: Role::Admin,
        };
        assert!(ensure_admin(&admin).is_ok());
    }
}
