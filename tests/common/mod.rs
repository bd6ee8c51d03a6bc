#![allow(dead_code)]

use std::sync::Arc;

use axum::http::header::{HeaderName, HeaderValue, AUTHORIZATION};
use axum_test::TestServer;
use serde_json::{json, Value};

use helpdesk_api::app::app;
use helpdesk_api::auth;
use helpdesk_api::models::{Availability, NewUser, Role, User};
use helpdesk_api::store::{AppState, MemoryStore, Store};

/// In-process server over a fresh in-memory store. The store handle is kept
/// so tests can seed state that has no public endpoint (admins, agents,
/// deactivated accounts).
pub struct TestApp {
    pub server: TestServer,
    pub store: Arc<MemoryStore>,
}

pub async fn spawn_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(store.clone());
    let mut server = TestServer::new(app(state)).expect("failed to start test server");
    server.do_save_cookies();
    TestApp { server, store }
}

pub fn bearer(token: &str) -> (HeaderName, HeaderValue) {
    (
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {token}")).expect("invalid token header"),
    )
}

/// Registers through the public endpoint and returns the access token.
pub async fn register(app: &TestApp, name: &str, email: &str, password: &str) -> String {
    let response = app
        .server
        .post("/auth/register")
        .json(&json!({ "name": name, "email": email, "password": password }))
        .await;
    assert_eq!(response.status_code(), 201, "register failed: {}", response.text());
    let body: Value = response.json();
    body["data"]["access_token"]
        .as_str()
        .expect("missing access token")
        .to_string()
}

/// Seeds a user directly in the store, bypassing the public registration
/// path, and returns the record plus a valid access token.
pub async fn seed_user(app: &TestApp, email: &str, role: Role) -> (User, String) {
    let user = app
        .store
        .create_user(NewUser {
            name: email.split('@').next().unwrap_or("user").to_string(),
            email: email.to_string(),
            password_hash: auth::hash_password("password123").expect("hash failed"),
            role,
            phone_number: None,
            department: None,
            specializations: vec![],
            availability: match role {
                Role::Agent => Some(Availability::Available),
                _ => None,
            },
        })
        .await
        .expect("failed to seed user");
    let token = auth::issue_access_token(&user).expect("failed to issue token");
    (user, token)
}

pub async fn seed_admin(app: &TestApp, email: &str) -> (User, String) {
    seed_user(app, email, Role::Admin).await
}

pub async fn seed_agent(app: &TestApp, email: &str) -> (User, String) {
    seed_user(app, email, Role::Agent).await
}
