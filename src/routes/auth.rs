use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::db::UserRepository;
use crate::error::{AppError, AppResult};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/me", get(me))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub display_name: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserResponse,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: usize,
    exp: usize,
}

impl From<crate::db::User> for UserResponse {
    fn from(user: crate::db::User) -> Self {
        UserResponse {
            id: user.id,
            email: user.email,
            display_name: user.display_name,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Create an account and return a bearer token for it
async fn register(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> AppResult<Json<AuthResponse>> {
    let email = request.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::Validation("invalid email address".to_string()));
    }
    if request.password.len() < 8 {
        return Err(AppError::Validation(
            "password must be at least 8 characters".to_string(),
        ));
    }
    if request.display_name.trim().is_empty() {
        return Err(AppError::Validation(
            "display name cannot be empty".to_string(),
        ));
    }

    if UserRepository::find_by_email(&state.db, &email).await?.is_some() {
        return Err(AppError::Conflict("email is already registered".to_string()));
    }

    let password_hash = bcrypt::hash(&request.password, bcrypt::DEFAULT_COST)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("password hashing failed: {}", e)))?;

    let user =
        UserRepository::create(&state.db, &email, &password_hash, request.display_name.trim())
            .await?;

    tracing::info!("Registered user {}", user.id);

    let token = create_jwt(&state, &user.id)?;
    Ok(Json(AuthResponse {
        token,
        user: user.into(),
    }))
}

/// Exchange email + password for a bearer token
async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let email = request.email.trim().to_lowercase();

    let user = UserRepository::find_by_email(&state.db, &email)
        .await?
        .ok_or(AppError::Unauthorized)?;

    let valid = bcrypt::verify(&request.password, &user.password_hash)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("password verification failed: {}", e)))?;
    if !valid {
        tracing::debug!("Failed login attempt for {}", email);
        return Err(AppError::Unauthorized);
    }

    let token = create_jwt(&state, &user.id)?;
    Ok(Json(AuthResponse {
        token,
        user: user.into(),
    }))
}

/// Return the authenticated user
async fn me(AuthUser(user): AuthUser) -> AppResult<Json<UserResponse>> {
    Ok(Json(user.into()))
}

// ============================================================================
// JWT helpers
// ============================================================================

/// Create a JWT for the given user id
fn create_jwt(state: &Arc<AppState>, user_id: &str) -> Result<String, AppError> {
    let now = Utc::now();
    let exp = now + Duration::hours(state.config.jwt.expiration_hours);

    let claims = Claims {
        sub: user_id.to_string(),
        iat: now.timestamp() as usize,
        exp: exp.timestamp() as usize,
    };

    let header = Header::default();
    let token = encode(
        &header,
        &claims,
        &EncodingKey::from_secret(state.config.jwt.secret.as_bytes()),
    )?;
    Ok(token)
}

/// Decode and validate a JWT, returning the claims
fn decode_jwt(state: &Arc<AppState>, token: &str) -> Result<Claims, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.config.jwt.secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

async fn get_user_from_token(
    state: &Arc<AppState>,
    token: &str,
) -> Result<crate::db::User, AppError> {
    let claims = decode_jwt(state, token)?;
    UserRepository::find_by_id(&state.db, &claims.sub)
        .await?
        .ok_or(AppError::Unauthorized)
}

// ============================================================================
// Auth Middleware / Extractor
// ============================================================================

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

/// Extractor for authenticated user
pub struct AuthUser(pub crate::db::User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        // Extract Authorization header (Bearer token)
        let auth_header = parts
            .headers
            .get(http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                tracing::debug!("Missing or invalid Authorization header");
                AppError::Unauthorized
            })?;

        if !auth_header.to_ascii_lowercase().starts_with("bearer ") {
            tracing::debug!("Authorization header doesn't start with 'Bearer '");
            return Err(AppError::Unauthorized);
        }

        let token = auth_header[7..].trim();
        if token.is_empty() {
            tracing::debug!("Empty bearer token in Authorization header");
            return Err(AppError::Unauthorized);
        }

        let user = get_user_from_token(state, token).await.map_err(|e| {
            tracing::debug!("Failed to get user from token: {:?}", e);
            e
        })?;

        Ok(AuthUser(user))
    }
}
