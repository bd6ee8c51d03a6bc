//! Profile self-service plus the admin-only user and agent management
//! routes. Role changes only happen through the admin update path; the
//! profile route deliberately has no role field.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth;
use crate::error::ApiError;
use crate::handlers::util::{
    validate_email, validate_password, validate_required, FieldErrors,
};
use crate::middleware::{ApiResponse, ApiResult, CurrentUser};
use crate::models::{Availability, NewUser, Role, User, UserPatch, UserResponse};
use crate::store::AppState;

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub phone_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AdminUpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub phone_number: Option<String>,
    pub department: Option<String>,
    pub specializations: Option<Vec<String>>,
    pub availability: Option<Availability>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CreateAgentRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone_number: Option<String>,
    pub department: Option<String>,
    #[serde(default)]
    pub specializations: Vec<String>,
    pub availability: Option<Availability>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAgentRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub department: Option<String>,
    pub specializations: Option<Vec<String>>,
    pub availability: Option<Availability>,
    pub is_active: Option<bool>,
}

async fn load_user(state: &AppState, id: Uuid) -> Result<User, ApiError> {
    state
        .store
        .get_user(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("No user found with id: {id}")))
}

async fn load_agent(state: &AppState, id: Uuid) -> Result<User, ApiError> {
    state
        .store
        .get_user(id)
        .await?
        .filter(|user| user.role == Role::Agent)
        .ok_or_else(|| ApiError::not_found(format!("No agent found with id: {id}")))
}

/// GET /users/profile.
pub async fn get_profile(
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResult<UserResponse> {
    Ok(ApiResponse::success(UserResponse::from(&user)))
}

/// PUT /users/profile. A `role` key in the payload is ignored; the request
/// type simply has no such field.
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<UpdateProfileRequest>,
) -> ApiResult<UserResponse> {
    let mut errors = FieldErrors::new();
    if let Some(name) = &payload.name {
        errors.check("name", validate_required(name, "Name"));
    }
    if let Some(email) = &payload.email {
        errors.check("email", validate_email(email));
    }
    if let Some(password) = &payload.password {
        errors.check("password", validate_password(password));
    }
    errors.into_result()?;

    let password_hash = match &payload.password {
        Some(password) => Some(auth::hash_password(password)?),
        None => None,
    };

    let updated = state
        .store
        .update_user(
            user.id,
            UserPatch {
                name: payload.name,
                email: payload.email,
                password_hash,
                phone_number: payload.phone_number,
                ..UserPatch::default()
            },
        )
        .await?
        .ok_or_else(|| ApiError::not_found(format!("No user found with id: {}", user.id)))?;

    Ok(ApiResponse::success(UserResponse::from(&updated)))
}

// --- Admin: user management ---

/// GET /users/admin/users.
pub async fn list_users(State(state): State<AppState>) -> ApiResult<Vec<UserResponse>> {
    let users = state.store.list_users().await?;
    Ok(ApiResponse::success(
        users.iter().map(UserResponse::from).collect(),
    ))
}

/// GET /users/admin/users/:id.
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<UserResponse> {
    let user = load_user(&state, id).await?;
    Ok(ApiResponse::success(UserResponse::from(&user)))
}

/// PUT /users/admin/users/:id. Password changes are excluded from this
/// route; users reset their own credentials.
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdminUpdateUserRequest>,
) -> ApiResult<UserResponse> {
    let mut errors = FieldErrors::new();
    if let Some(name) = &payload.name {
        errors.check("name", validate_required(name, "Name"));
    }
    if let Some(email) = &payload.email {
        errors.check("email", validate_email(email));
    }
    errors.into_result()?;

    let updated = state
        .store
        .update_user(
            id,
            UserPatch {
                name: payload.name,
                email: payload.email,
                role: payload.role,
                phone_number: payload.phone_number,
                department: payload.department,
                specializations: payload.specializations,
                availability: payload.availability,
                is_active: payload.is_active,
                ..UserPatch::default()
            },
        )
        .await?
        .ok_or_else(|| ApiError::not_found(format!("No user found with id: {id}")))?;

    Ok(ApiResponse::success(UserResponse::from(&updated)))
}

/// DELETE /users/admin/users/:id. Refuses to remove the last admin; the
/// store enforces that atomically.
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Value> {
    load_user(&state, id).await?;
    state.store.delete_user(id).await?;
    Ok(ApiResponse::success(
        json!({ "message": "User deleted successfully" }),
    ))
}

// --- Admin: agent management ---

/// GET /users/admin/agents.
pub async fn list_agents(State(state): State<AppState>) -> ApiResult<Vec<UserResponse>> {
    let agents = state.store.list_users_by_role(Role::Agent).await?;
    Ok(ApiResponse::success(
        agents.iter().map(UserResponse::from).collect(),
    ))
}

/// POST /users/admin/agents. Always provisions with the agent role.
pub async fn create_agent(
    State(state): State<AppState>,
    Json(payload): Json<CreateAgentRequest>,
) -> ApiResult<UserResponse> {
    let mut errors = FieldErrors::new();
    errors.check("name", validate_required(&payload.name, "Name"));
    errors.check("email", validate_email(&payload.email));
    errors.check("password", validate_password(&payload.password));
    errors.into_result()?;

    let password_hash = auth::hash_password(&payload.password)?;
    let agent = state
        .store
        .create_user(NewUser {
            name: payload.name.trim().to_string(),
            email: payload.email.trim().to_lowercase(),
            password_hash,
            role: Role::Agent,
            phone_number: payload.phone_number,
            department: payload.department,
            specializations: payload.specializations,
            availability: Some(payload.availability.unwrap_or(Availability::Available)),
        })
        .await?;

    tracing::info!(agent = %agent.id, "agent account created");
    Ok(ApiResponse::created(UserResponse::from(&agent)))
}

/// GET /users/admin/agents/:id.
pub async fn get_agent(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<UserResponse> {
    let agent = load_agent(&state, id).await?;
    Ok(ApiResponse::success(UserResponse::from(&agent)))
}

/// PUT /users/admin/agents/:id. No role field: promoting or demoting goes
/// through the general user update route.
pub async fn update_agent(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateAgentRequest>,
) -> ApiResult<UserResponse> {
    load_agent(&state, id).await?;

    let mut errors = FieldErrors::new();
    if let Some(name) = &payload.name {
        errors.check("name", validate_required(name, "Name"));
    }
    if let Some(email) = &payload.email {
        errors.check("email", validate_email(email));
    }
    errors.into_result()?;

    let updated = state
        .store
        .update_user(
            id,
            UserPatch {
                name: payload.name,
                email: payload.email,
                phone_number: payload.phone_number,
                department: payload.department,
                specializations: payload.specializations,
                availability: payload.availability,
                is_active: payload.is_active,
                ..UserPatch::default()
            },
        )
        .await?
        .ok_or_else(|| ApiError::not_found(format!("No agent found with id: {id}")))?;

    Ok(ApiResponse::success(UserResponse::from(&updated)))
}

/// DELETE /users/admin/agents/:id.
pub async fn delete_agent(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Value> {
    load_agent(&state, id).await?;
    state.store.delete_user(id).await?;
    Ok(ApiResponse::success(
        json!({ "message": "Agent deleted successfully" }),
    ))
}
