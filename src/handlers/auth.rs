//! Registration, login, refresh rotation, and logout.
//!
//! The access token travels in the response body; the refresh token only
//! ever travels in an HttpOnly cookie. Every successful login/refresh
//! rotates the refresh token and persists the new one on the user record,
//! invalidating the previous one.

use axum::extract::State;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::auth;
use crate::config;
use crate::error::ApiError;
use crate::handlers::util::{validate_email, validate_password, validate_required, FieldErrors};
use crate::middleware::ApiResponse;
use crate::models::{NewUser, Role, User, UserResponse};
use crate::store::AppState;
use axum::Json;

pub const REFRESH_COOKIE: &str = "refresh_token";

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub phone_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: UserResponse,
    pub access_token: String,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub access_token: String,
}

fn refresh_cookie(token: String) -> Cookie<'static> {
    let security = &config::config().security;
    let mut cookie = Cookie::new(REFRESH_COOKIE, token);
    cookie.set_http_only(true);
    cookie.set_secure(security.cookie_secure);
    cookie.set_same_site(SameSite::Strict);
    cookie.set_path("/");
    cookie.set_max_age(time::Duration::days(security.refresh_token_ttl_days));
    cookie
}

fn removal_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::new(REFRESH_COOKIE, "");
    cookie.set_path("/");
    cookie
}

/// Issues a fresh access/refresh pair and persists the refresh token,
/// rotating out whatever token the user held before.
async fn issue_session(state: &AppState, user: &User) -> Result<(String, String), ApiError> {
    let access_token = auth::issue_access_token(user)?;
    let refresh_token = auth::issue_refresh_token(user.id)?;
    state
        .store
        .store_refresh_token(user.id, Some(refresh_token.clone()))
        .await?;
    Ok((access_token, refresh_token))
}

/// POST /auth/register. Self-registration always produces a `user` role;
/// agents and admins are provisioned through the admin routes.
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<RegisterRequest>,
) -> Result<(CookieJar, ApiResponse<SessionResponse>), ApiError> {
    let mut errors = FieldErrors::new();
    errors.check("name", validate_required(&payload.name, "Name"));
    errors.check("email", validate_email(&payload.email));
    errors.check("password", validate_password(&payload.password));
    errors.into_result()?;

    let password_hash = auth::hash_password(&payload.password)?;
    let user = state
        .store
        .create_user(NewUser {
            name: payload.name.trim().to_string(),
            email: payload.email.trim().to_lowercase(),
            password_hash,
            role: Role::User,
            phone_number: payload.phone_number,
            department: None,
            specializations: vec![],
            availability: None,
        })
        .await?;

    let (access_token, refresh_token) = issue_session(&state, &user).await?;
    state.store.mark_logged_in(user.id).await?;

    tracing::info!(user = %user.id, "registered new user");
    Ok((
        jar.add(refresh_cookie(refresh_token)),
        ApiResponse::created(SessionResponse {
            user: UserResponse::from(&user),
            access_token,
        }),
    ))
}

/// POST /auth/login.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Result<(CookieJar, ApiResponse<SessionResponse>), ApiError> {
    let mut errors = FieldErrors::new();
    errors.check("email", validate_email(&payload.email));
    errors.check("password", validate_required(&payload.password, "Password"));
    errors.into_result()?;

    let email = payload.email.trim().to_lowercase();
    let user = state
        .store
        .find_user_by_email(&email)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid credentials"))?;

    if !auth::verify_password(&payload.password, &user.password_hash)? {
        return Err(ApiError::unauthorized("Invalid credentials"));
    }
    if !user.is_active {
        return Err(ApiError::unauthorized("User account is deactivated"));
    }

    let (access_token, refresh_token) = issue_session(&state, &user).await?;
    state.store.mark_logged_in(user.id).await?;

    tracing::info!(user = %user.id, "user logged in");
    Ok((
        jar.add(refresh_cookie(refresh_token)),
        ApiResponse::success(SessionResponse {
            user: UserResponse::from(&user),
            access_token,
        }),
    ))
}

/// POST /auth/refresh. The presented cookie must match the token persisted
/// on the user record; a rotated-away token is rejected even if its
/// signature is still valid.
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, ApiResponse<RefreshResponse>), ApiError> {
    let token = jar
        .get(REFRESH_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .ok_or_else(|| ApiError::unauthorized("No refresh token provided"))?;

    let claims = auth::decode_refresh_token(&token)
        .map_err(|_| ApiError::unauthorized("Invalid refresh token"))?;

    let user = state
        .store
        .get_user(claims.sub)
        .await?
        .filter(|user| user.refresh_token.as_deref() == Some(token.as_str()))
        .ok_or_else(|| ApiError::unauthorized("Invalid refresh token"))?;

    if !user.is_active {
        return Err(ApiError::unauthorized("User account is deactivated"));
    }

    let (access_token, refresh_token) = issue_session(&state, &user).await?;
    Ok((
        jar.add(refresh_cookie(refresh_token)),
        ApiResponse::success(RefreshResponse { access_token }),
    ))
}

/// POST /auth/logout. Clears the persisted refresh token and expires the
/// cookie. Safe to call without a valid session.
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, ApiResponse<Value>), ApiError> {
    if let Some(cookie) = jar.get(REFRESH_COOKIE) {
        if let Some(user) = state.store.find_user_by_refresh_token(cookie.value()).await? {
            state.store.store_refresh_token(user.id, None).await?;
            tracing::info!(user = %user.id, "user logged out");
        }
    }

    let jar = jar.remove(removal_cookie());
    Ok((
        jar,
        ApiResponse::success(json!({ "message": "Logged out successfully" })),
    ))
}
