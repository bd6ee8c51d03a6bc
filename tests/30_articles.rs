mod common;

use common::{bearer, seed_agent, seed_user, spawn_app, TestApp};
use helpdesk_api::models::Role;
use serde_json::{json, Value};
use uuid::Uuid;

async fn create_article(app: &TestApp, token: &str, title: &str) -> Uuid {
    let (name, value) = bearer(token);
    let response = app
        .server
        .post("/articles")
        .add_header(name, value)
        .json(&json!({
            "title": title,
            "content": "Restart it first.",
        }))
        .await;
    assert_eq!(response.status_code(), 201, "create failed: {}", response.text());
    let body: Value = response.json();
    body["data"]["id"].as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn only_staff_create_articles() {
    let app = spawn_app().await;
    let (_, user) = seed_user(&app, "ada@example.com", Role::User).await;
    let (_, agent) = seed_agent(&app, "agent@example.com").await;

    let (name, value) = bearer(&user);
    let forbidden = app
        .server
        .post("/articles")
        .add_header(name, value)
        .json(&json!({ "title": "How to reboot", "content": "Turn it off and on." }))
        .await;
    assert_eq!(forbidden.status_code(), 403);

    let (name, value) = bearer(&agent);
    let created = app
        .server
        .post("/articles")
        .add_header(name, value)
        .json(&json!({ "title": "How to reboot", "content": "Turn it off and on." }))
        .await;
    assert_eq!(created.status_code(), 201);
    let body: Value = created.json();
    assert_eq!(body["data"]["type"], "regular");
    assert_eq!(body["data"]["is_public"], true);
    assert_eq!(body["data"]["likes"], 0);
}

#[tokio::test]
async fn anyone_authenticated_can_read() {
    let app = spawn_app().await;
    let (_, user) = seed_user(&app, "ada@example.com", Role::User).await;
    let (_, agent) = seed_agent(&app, "agent@example.com").await;
    let id = create_article(&app, &agent, "Password resets").await;

    let (name, value) = bearer(&user);
    let list = app.server.get("/articles").add_header(name, value).await;
    assert_eq!(list.status_code(), 200);
    let body: Value = list.json();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (name, value) = bearer(&user);
    let one = app
        .server
        .get(&format!("/articles/{id}"))
        .add_header(name, value)
        .await;
    assert_eq!(one.status_code(), 200);
}

#[tokio::test]
async fn update_and_delete_are_staff_only() {
    let app = spawn_app().await;
    let (_, user) = seed_user(&app, "ada@example.com", Role::User).await;
    let (_, agent) = seed_agent(&app, "agent@example.com").await;
    let id = create_article(&app, &agent, "Old title").await;

    let (name, value) = bearer(&user);
    let forbidden = app
        .server
        .put(&format!("/articles/{id}"))
        .add_header(name, value)
        .json(&json!({ "title": "Hijacked" }))
        .await;
    assert_eq!(forbidden.status_code(), 403);

    let (name, value) = bearer(&agent);
    let updated = app
        .server
        .put(&format!("/articles/{id}"))
        .add_header(name, value)
        .json(&json!({ "title": "New title", "type": "daily" }))
        .await;
    assert_eq!(updated.status_code(), 200);
    let body: Value = updated.json();
    assert_eq!(body["data"]["title"], "New title");
    assert_eq!(body["data"]["type"], "daily");

    let (name, value) = bearer(&user);
    let forbidden_delete = app
        .server
        .delete(&format!("/articles/{id}"))
        .add_header(name, value)
        .await;
    assert_eq!(forbidden_delete.status_code(), 403);

    let (name, value) = bearer(&agent);
    let deleted = app
        .server
        .delete(&format!("/articles/{id}"))
        .add_header(name, value)
        .await;
    assert_eq!(deleted.status_code(), 200);

    let (name, value) = bearer(&agent);
    let gone = app
        .server
        .get(&format!("/articles/{id}"))
        .add_header(name, value)
        .await;
    assert_eq!(gone.status_code(), 404);
}

#[tokio::test]
async fn like_toggles_cleanly() {
    let app = spawn_app().await;
    let (ada, ada_token) = seed_user(&app, "ada@example.com", Role::User).await;
    let (_, agent) = seed_agent(&app, "agent@example.com").await;
    let id = create_article(&app, &agent, "Likeable").await;

    let (name, value) = bearer(&ada_token);
    let liked = app
        .server
        .post(&format!("/articles/{id}/like"))
        .add_header(name, value)
        .await;
    assert_eq!(liked.status_code(), 200);
    let body: Value = liked.json();
    assert_eq!(body["data"]["likes"], 1);
    assert_eq!(body["data"]["liked_by"][0], ada.id.to_string());

    // Second toggle withdraws the like.
    let (name, value) = bearer(&ada_token);
    let unliked = app
        .server
        .post(&format!("/articles/{id}/like"))
        .add_header(name, value)
        .await;
    let body: Value = unliked.json();
    assert_eq!(body["data"]["likes"], 0);
    assert!(body["data"]["liked_by"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn likes_from_different_users_accumulate() {
    let app = spawn_app().await;
    let (_, ada) = seed_user(&app, "ada@example.com", Role::User).await;
    let (_, bob) = seed_user(&app, "bob@example.com", Role::User).await;
    let (_, agent) = seed_agent(&app, "agent@example.com").await;
    let id = create_article(&app, &agent, "Popular").await;

    for token in [&ada, &bob] {
        let (name, value) = bearer(token);
        app.server
            .post(&format!("/articles/{id}/like"))
            .add_header(name, value)
            .await;
    }

    let (name, value) = bearer(&ada);
    let response = app
        .server
        .get(&format!("/articles/{id}"))
        .add_header(name, value)
        .await;
    let body: Value = response.json();
    assert_eq!(body["data"]["likes"], 2);
    assert_eq!(body["data"]["liked_by"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn comments_append_in_order() {
    let app = spawn_app().await;
    let (ada, ada_token) = seed_user(&app, "ada@example.com", Role::User).await;
    let (_, agent) = seed_agent(&app, "agent@example.com").await;
    let id = create_article(&app, &agent, "Discussable").await;

    let (name, value) = bearer(&ada_token);
    let response = app
        .server
        .post(&format!("/articles/{id}/comments"))
        .add_header(name, value)
        .json(&json!({ "content": "This saved my day" }))
        .await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    let comments = body["data"]["comments"].as_array().unwrap();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0]["content"], "This saved my day");
    assert_eq!(comments[0]["user"], ada.id.to_string());
}

#[tokio::test]
async fn empty_comment_is_rejected() {
    let app = spawn_app().await;
    let (_, token) = seed_user(&app, "ada@example.com", Role::User).await;
    let (_, agent) = seed_agent(&app, "agent@example.com").await;
    let id = create_article(&app, &agent, "Quiet").await;

    let (name, value) = bearer(&token);
    let response = app
        .server
        .post(&format!("/articles/{id}/comments"))
        .add_header(name, value)
        .json(&json!({ "content": "   " }))
        .await;
    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn missing_article_is_404() {
    let app = spawn_app().await;
    let (_, token) = seed_user(&app, "ada@example.com", Role::User).await;

    let (name, value) = bearer(&token);
    let response = app
        .server
        .post(&format!("/articles/{}/like", Uuid::new_v4()))
        .add_header(name, value)
        .await;
    assert_eq!(response.status_code(), 404);
}
