//! Route table and middleware stack.
//!
//! Three tiers: public routes, authenticated routes, and role-gated route
//! groups. Each gated group carries its [`RolePolicy`] right next to the
//! route declarations so the access rules are visible in one place.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::handlers::{articles, auth, tickets, users};
use crate::middleware::{authenticate, RolePolicy};
use crate::store::AppState;

pub fn app(state: AppState) -> Router {
    let public = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/logout", post(auth::logout));

    let agent_routes = Router::new()
        .route("/users/agent/tickets/all", get(tickets::list_all))
        .route("/users/agent/tickets/open", get(tickets::list_open))
        .route("/users/agent/tickets/assigned", get(tickets::list_assigned))
        .route_layer(middleware::from_fn(|request, next| {
            RolePolicy::AGENTS.enforce(request, next)
        }));

    let admin_routes = Router::new()
        .route("/users/admin/users", get(users::list_users))
        .route(
            "/users/admin/users/:id",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .route(
            "/users/admin/agents",
            get(users::list_agents).post(users::create_agent),
        )
        .route(
            "/users/admin/agents/:id",
            get(users::get_agent)
                .put(users::update_agent)
                .delete(users::delete_agent),
        )
        .route_layer(middleware::from_fn(|request, next| {
            RolePolicy::ADMIN_ONLY.enforce(request, next)
        }));

    let protected = Router::new()
        .route(
            "/users/profile",
            get(users::get_profile).put(users::update_profile),
        )
        .route(
            "/users/tickets",
            get(tickets::list_own).post(tickets::create),
        )
        .route(
            "/users/tickets/:id",
            get(tickets::get_one).patch(tickets::update),
        )
        .route("/users/tickets/:id/comments", post(tickets::add_comment))
        .route("/users/tickets/:id/escalate", post(tickets::escalate))
        .route("/articles", get(articles::list).post(articles::create))
        .route(
            "/articles/:id",
            get(articles::get_one)
                .put(articles::update)
                .delete(articles::delete),
        )
        .route("/articles/:id/like", post(articles::toggle_like))
        .route("/articles/:id/comments", post(articles::add_comment))
        .merge(agent_routes)
        .merge(admin_routes)
        .route_layer(middleware::from_fn_with_state(state.clone(), authenticate));

    public
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "name": "helpdesk-api",
        "endpoints": ["/auth", "/users", "/tickets", "/articles"],
    }))
}

async fn health(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .store
        .health()
        .await
        .map_err(|_| ApiError::service_unavailable("Database temporarily unavailable"))?;
    Ok(Json(json!({ "status": "ok" })))
}
