//! Authentication and role-policy middleware.
//!
//! `authenticate` validates the bearer token and loads the principal; a
//! [`RolePolicy`] is attached per route group and checks the principal's
//! role against an explicit allowed set. Ownership checks stay in the
//! handlers, next to the resource they guard.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::auth;
use crate::error::ApiError;
use crate::models::{Role, User};
use crate::store::AppState;

/// The authenticated principal, injected as a request extension.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Bearer-token authentication. Loads the referenced user so downstream
/// checks see current role and activity state, not stale token claims.
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer_token(request.headers())?;
    let claims = auth::decode_access_token(&token)?;

    let user = state
        .store
        .get_user(claims.sub)
        .await?
        .ok_or_else(|| ApiError::unauthorized("User not found"))?;

    if !user.is_active {
        return Err(ApiError::unauthorized("User account is deactivated"));
    }

    request.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(request).await)
}

fn extract_bearer_token(headers: &HeaderMap) -> Result<String, ApiError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| ApiError::unauthorized("No token provided, authorization denied"))?;

    let value = header
        .to_str()
        .map_err(|_| ApiError::unauthorized("Invalid authorization header"))?;

    let token = value
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::unauthorized("Invalid token format. Use Bearer scheme"))?;

    if token.trim().is_empty() {
        return Err(ApiError::unauthorized("No token provided, authorization denied"));
    }
    Ok(token.to_string())
}

/// Allowed-role set for a route group. Declared as a const next to the
/// route declarations it guards rather than relying on middleware ordering.
#[derive(Debug, Clone, Copy)]
pub struct RolePolicy {
    allowed: &'static [Role],
}

impl RolePolicy {
    pub const AGENTS: RolePolicy = RolePolicy {
        allowed: &[Role::Agent, Role::Admin],
    };

    pub const ADMIN_ONLY: RolePolicy = RolePolicy {
        allowed: &[Role::Admin],
    };

    pub fn allows(&self, role: Role) -> bool {
        self.allowed.contains(&role)
    }

    /// Middleware entry point; expects `authenticate` to have run already.
    pub async fn enforce(self, request: Request, next: Next) -> Result<Response, ApiError> {
        let user = request
            .extensions()
            .get::<CurrentUser>()
            .ok_or_else(|| ApiError::unauthorized("No token provided, authorization denied"))?;

        if !self.allows(user.0.role) {
            return Err(ApiError::forbidden(format!(
                "Role {} is not authorized to access this route",
                user.0.role
            )));
        }
        Ok(next.run(request).await)
    }
}
