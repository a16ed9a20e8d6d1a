use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use password_hash::rand_core::OsRng;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, EntityTrait, QueryFilter, Set,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    audit,
    config::AppConfig,
    dto::auth::{AuthResponse, Claims, LoginRequest, RefreshClaims, RefreshRequest, RegisterRequest, TokenPair},
    entity::users::{ActiveModel as UserActive, Column as UserCol, Entity as Users, Model as UserModel},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Role, User},
    response::{ApiResponse, Meta},
    state::AppState,
};

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

pub fn verify_password(password: &str, password_hash: &str) -> AppResult<bool> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid password hash")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Sign an access token and a refresh token for `user_id`.
pub fn issue_tokens(config: &AppConfig, user_id: Uuid, role: &str) -> AppResult<TokenPair> {
    let now = Utc::now();
    let access_exp = now
        .checked_add_signed(Duration::hours(config.access_token_ttl_hours))
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))?;
    let refresh_exp = now
        .checked_add_signed(Duration::days(config.refresh_token_ttl_days))
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))?;

    let claims = Claims {
        sub: user_id.to_string(),
        role: role.to_string(),
        exp: access_exp.timestamp() as usize,
        iat: now.timestamp() as usize,
    };
    let access_token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?;

    let refresh_claims = RefreshClaims {
        sub: user_id.to_string(),
        jti: Uuid::new_v4().to_string(),
        exp: refresh_exp.timestamp() as usize,
        iat: now.timestamp() as usize,
    };
    let refresh_token = encode(
        &Header::default(),
        &refresh_claims,
        &EncodingKey::from_secret(config.refresh_token_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?;

    Ok(TokenPair {
        access_token,
        refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: config.access_token_ttl_hours * 3600,
    })
}

pub fn decode_access_token(secret: &str, token: &str) -> AppResult<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::Unauthorized("Invalid or expired token".into()))
}

pub fn decode_refresh_token(secret: &str, token: &str) -> AppResult<RefreshClaims> {
    decode::<RefreshClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::Unauthorized("Invalid or expired refresh token".into()))
}

async fn store_refresh_token(
    state: &AppState,
    user: UserModel,
    refresh_token: Option<String>,
) -> AppResult<UserModel> {
    let mut active: UserActive = user.into();
    active.refresh_token = Set(refresh_token);
    Ok(active.update(&state.orm).await?)
}

pub async fn register_user(
    state: &AppState,
    payload: RegisterRequest,
) -> AppResult<ApiResponse<AuthResponse>> {
    payload.validate()?;
    let RegisterRequest {
        name,
        email,
        password,
        profile_picture,
    } = payload;
    let email = email.trim().to_lowercase();

    let exist = Users::find()
        .filter(UserCol::Email.eq(email.as_str()))
        .one(&state.orm)
        .await?;
    if exist.is_some() {
        return Err(AppError::Conflict(
            "An account with this email already exists".to_string(),
        ));
    }

    let password_hash = hash_password(&password)?;
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        name: Set(name.trim().to_string()),
        email: Set(email),
        password_hash: Set(password_hash),
        contact_number: Set(None),
        street: Set(None),
        city: Set(None),
        state: Set(None),
        zip_code: Set(None),
        country: Set(None),
        profile_picture: Set(profile_picture),
        refresh_token: Set(None),
        role: Set(Role::User.as_str().to_string()),
        is_verified: Set(false),
        is_deleted: Set(false),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    let tokens = issue_tokens(&state.config, user.id, &user.role)?;
    let user = store_refresh_token(state, user, Some(tokens.refresh_token.clone())).await?;

    audit::record(
        &state.orm,
        Some(user.id),
        "user_register",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;
    tracing::info!(user_id = %user.id, "user registered");

    Ok(ApiResponse::success(
        "User registered successfully",
        AuthResponse {
            user: User::from(user),
            tokens,
        },
        Some(Meta::empty()),
    ))
}

pub async fn login_user(
    state: &AppState,
    payload: LoginRequest,
) -> AppResult<ApiResponse<AuthResponse>> {
    payload.validate()?;
    let LoginRequest { email, password } = payload;
    let email = email.trim().to_lowercase();

    let user = Users::find()
        .filter(UserCol::Email.eq(email.as_str()))
        .filter(UserCol::IsDeleted.eq(false))
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid credentials".into()))?;

    if !verify_password(&password, &user.password_hash)? {
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    }

    let tokens = issue_tokens(&state.config, user.id, &user.role)?;
    let user = store_refresh_token(state, user, Some(tokens.refresh_token.clone())).await?;

    audit::record(
        &state.orm,
        Some(user.id),
        "user_login",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "User logged in successfully",
        AuthResponse {
            user: User::from(user),
            tokens,
        },
        Some(Meta::empty()),
    ))
}

/// Exchange a refresh token for a new pair. The presented token must be the
/// one currently stored; it is replaced, so each refresh token works once.
pub async fn refresh_tokens(
    state: &AppState,
    payload: RefreshRequest,
) -> AppResult<ApiResponse<TokenPair>> {
    let claims = decode_refresh_token(&state.config.refresh_token_secret, &payload.refresh_token)?;
    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::Unauthorized("Invalid user id in token".into()))?;

    let user = Users::find_by_id(user_id)
        .one(&state.orm)
        .await?
        .filter(|u| !u.is_deleted)
        .ok_or_else(|| AppError::Unauthorized("Invalid refresh token".into()))?;

    if user.refresh_token.as_deref() != Some(payload.refresh_token.as_str()) {
        tracing::warn!(user_id = %user.id, "refresh token reuse or mismatch");
        return Err(AppError::Unauthorized(
            "Refresh token is expired or used".into(),
        ));
    }

    let tokens = issue_tokens(&state.config, user.id, &user.role)?;
    store_refresh_token(state, user, Some(tokens.refresh_token.clone())).await?;

    Ok(ApiResponse::success(
        "Access token refreshed",
        tokens,
        Some(Meta::empty()),
    ))
}

pub async fn logout_user(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let model = Users::find_by_id(user.user_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;
    store_refresh_token(state, model, None).await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "user_logout",
        "users",
        serde_json::json!({ "user_id": user.user_id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Logout successful",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AppConfig {
        AppConfig {
            database_url: "postgres://localhost/test".into(),
            host: "127.0.0.1".into(),
            port: 3000,
            jwt_secret: "access-secret".into(),
            refresh_token_secret: "refresh-secret".into(),
            access_token_ttl_hours: 1,
            refresh_token_ttl_days: 7,
            cors_origin: "http://localhost:3000".into(),
            image_host_url: None,
            image_host_api_key: None,
        }
    }

    #[test]
    fn issued_tokens_decode_with_their_own_secret_only() {
        let config = config();
        let user_id = Uuid::new_v4();
        let pair = issue_tokens(&config, user_id, "seller").unwrap();

        let claims = decode_access_token(&config.jwt_secret, &pair.access_token).unwrap();
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.role, "seller");

        let refresh = decode_refresh_token(&config.refresh_token_secret, &pair.refresh_token).unwrap();
        assert_eq!(refresh.sub, user_id.to_string());

        assert!(decode_access_token(&config.jwt_secret, &pair.refresh_token).is_err());
        assert!(decode_refresh_token(&config.refresh_token_secret, &pair.access_token).is_err());
    }

    #[test]
    fn refresh_tokens_are_unique_per_issue() {
        let config = config();
        let user_id = Uuid::new_v4();
        let a = issue_tokens(&config, user_id, "user").unwrap();
        let b = issue_tokens(&config, user_id, "user").unwrap();
        assert_ne!(a.refresh_token, b.refresh_token);
    }

    #[test]
    fn password_hash_verifies_only_the_same_password() {
        let hash = hash_password("hunter22").unwrap();
        assert!(verify_password("hunter22", &hash).unwrap());
        assert!(!verify_password("hunter23", &hash).unwrap());
    }
}
