mod common;

use common::{bearer, seed_admin, seed_agent, seed_user, spawn_app, TestApp};
use helpdesk_api::models::Role;
use serde_json::{json, Value};
use uuid::Uuid;

async fn create_ticket(app: &TestApp, token: &str) -> Uuid {
    let (name, value) = bearer(token);
    let response = app
        .server
        .post("/users/tickets")
        .add_header(name, value)
        .json(&json!({
            "title": "Printer is on fire",
            "description": "Smoke coming from tray 2",
            "category": "technical",
            "priority": "high",
        }))
        .await;
    assert_eq!(response.status_code(), 201, "create failed: {}", response.text());
    let body: Value = response.json();
    body["data"]["id"].as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn ticket_creation_defaults_to_open() {
    let app = spawn_app().await;
    let (user, token) = seed_user(&app, "ada@example.com", Role::User).await;

    let (name, value) = bearer(&token);
    let response = app
        .server
        .post("/users/tickets")
        .add_header(name, value)
        .json(&json!({
            "title": "VPN down",
            "description": "Cannot connect since this morning",
            "category": "technical",
        }))
        .await;

    assert_eq!(response.status_code(), 201);
    let body: Value = response.json();
    assert_eq!(body["data"]["status"], "open");
    assert_eq!(body["data"]["priority"], "medium");
    assert_eq!(body["data"]["creator"], user.id.to_string());
}

#[tokio::test]
async fn ticket_requires_title_and_description() {
    let app = spawn_app().await;
    let (_, token) = seed_user(&app, "ada@example.com", Role::User).await;

    let (name, value) = bearer(&token);
    let response = app
        .server
        .post("/users/tickets")
        .add_header(name, value)
        .json(&json!({ "title": "", "description": "", "category": "general" }))
        .await;

    assert_eq!(response.status_code(), 400);
    let body: Value = response.json();
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn listing_shows_own_tickets_only() {
    let app = spawn_app().await;
    let (_, ada) = seed_user(&app, "ada@example.com", Role::User).await;
    let (_, bob) = seed_user(&app, "bob@example.com", Role::User).await;

    create_ticket(&app, &ada).await;
    create_ticket(&app, &ada).await;
    create_ticket(&app, &bob).await;

    let (name, value) = bearer(&ada);
    let response = app.server.get("/users/tickets").add_header(name, value).await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn strangers_cannot_view_a_ticket() {
    let app = spawn_app().await;
    let (_, ada) = seed_user(&app, "ada@example.com", Role::User).await;
    let (_, bob) = seed_user(&app, "bob@example.com", Role::User).await;
    let (_, admin) = seed_admin(&app, "root@example.com").await;

    let id = create_ticket(&app, &ada).await;

    let (name, value) = bearer(&bob);
    let forbidden = app
        .server
        .get(&format!("/users/tickets/{id}"))
        .add_header(name, value)
        .await;
    assert_eq!(forbidden.status_code(), 403);

    let (name, value) = bearer(&admin);
    let allowed = app
        .server
        .get(&format!("/users/tickets/{id}"))
        .add_header(name, value)
        .await;
    assert_eq!(allowed.status_code(), 200);
}

#[tokio::test]
async fn status_walks_the_transition_table() {
    let app = spawn_app().await;
    let (_, token) = seed_user(&app, "ada@example.com", Role::User).await;
    let id = create_ticket(&app, &token).await;

    // open -> resolved skips a state and is rejected.
    let (name, value) = bearer(&token);
    let skip = app
        .server
        .patch(&format!("/users/tickets/{id}"))
        .add_header(name, value)
        .json(&json!({ "status": "resolved" }))
        .await;
    assert_eq!(skip.status_code(), 400);

    // open -> in_progress -> resolved is the legal path.
    let (name, value) = bearer(&token);
    let step1 = app
        .server
        .patch(&format!("/users/tickets/{id}"))
        .add_header(name, value)
        .json(&json!({ "status": "in_progress" }))
        .await;
    assert_eq!(step1.status_code(), 200);

    let (name, value) = bearer(&token);
    let step2 = app
        .server
        .patch(&format!("/users/tickets/{id}"))
        .add_header(name, value)
        .json(&json!({ "status": "resolved" }))
        .await;
    assert_eq!(step2.status_code(), 200);
    let body: Value = step2.json();
    assert_eq!(body["data"]["status"], "resolved");
    // Reaching resolved stamps who resolved it and when.
    assert!(body["data"]["resolution"]["resolved_at"].is_string());

    // closed is terminal.
    let (name, value) = bearer(&token);
    let close = app
        .server
        .patch(&format!("/users/tickets/{id}"))
        .add_header(name, value)
        .json(&json!({ "status": "closed" }))
        .await;
    assert_eq!(close.status_code(), 200);

    let (name, value) = bearer(&token);
    let reopen = app
        .server
        .patch(&format!("/users/tickets/{id}"))
        .add_header(name, value)
        .json(&json!({ "status": "open" }))
        .await;
    assert_eq!(reopen.status_code(), 400);
}

#[tokio::test]
async fn escalated_is_not_a_legal_update_target() {
    let app = spawn_app().await;
    let (_, token) = seed_user(&app, "ada@example.com", Role::User).await;
    let id = create_ticket(&app, &token).await;

    let (name, value) = bearer(&token);
    let response = app
        .server
        .patch(&format!("/users/tickets/{id}"))
        .add_header(name, value)
        .json(&json!({ "status": "escalated" }))
        .await;
    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn only_the_creator_escalates() {
    let app = spawn_app().await;
    let (_, ada) = seed_user(&app, "ada@example.com", Role::User).await;
    let (_, admin) = seed_admin(&app, "root@example.com").await;
    let id = create_ticket(&app, &ada).await;

    let (name, value) = bearer(&admin);
    let forbidden = app
        .server
        .post(&format!("/users/tickets/{id}/escalate"))
        .add_header(name, value)
        .json(&json!({ "reason": "taking too long" }))
        .await;
    assert_eq!(forbidden.status_code(), 403);

    let (name, value) = bearer(&ada);
    let escalated = app
        .server
        .post(&format!("/users/tickets/{id}/escalate"))
        .add_header(name, value)
        .json(&json!({ "reason": "taking too long" }))
        .await;
    assert_eq!(escalated.status_code(), 200);
    let body: Value = escalated.json();
    assert_eq!(body["data"]["status"], "escalated");
    assert_eq!(body["data"]["escalation"]["reason"], "taking too long");
}

#[tokio::test]
async fn closed_tickets_cannot_be_escalated() {
    let app = spawn_app().await;
    let (_, token) = seed_user(&app, "ada@example.com", Role::User).await;
    let id = create_ticket(&app, &token).await;

    for status in ["in_progress", "resolved", "closed"] {
        let (name, value) = bearer(&token);
        let response = app
            .server
            .patch(&format!("/users/tickets/{id}"))
            .add_header(name, value)
            .json(&json!({ "status": status }))
            .await;
        assert_eq!(response.status_code(), 200);
    }

    let (name, value) = bearer(&token);
    let response = app
        .server
        .post(&format!("/users/tickets/{id}/escalate"))
        .add_header(name, value)
        .json(&json!({ "reason": "never mind" }))
        .await;
    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn internal_comments_stay_internal() {
    let app = spawn_app().await;
    let (_, ada) = seed_user(&app, "ada@example.com", Role::User).await;
    let (agent, agent_token) = seed_agent(&app, "agent@example.com").await;
    let (_, admin) = seed_admin(&app, "root@example.com").await;
    let id = create_ticket(&app, &ada).await;

    // Assign the agent so they can see and comment on the ticket.
    let (name, value) = bearer(&admin);
    let assign = app
        .server
        .patch(&format!("/users/tickets/{id}"))
        .add_header(name, value)
        .json(&json!({ "assigned_to": agent.id }))
        .await;
    assert_eq!(assign.status_code(), 200);

    let (name, value) = bearer(&agent_token);
    let internal = app
        .server
        .post(&format!("/users/tickets/{id}/comments"))
        .add_header(name, value)
        .json(&json!({ "content": "user seems confused", "is_internal": true }))
        .await;
    assert_eq!(internal.status_code(), 200);

    let (name, value) = bearer(&agent_token);
    let public = app
        .server
        .post(&format!("/users/tickets/{id}/comments"))
        .add_header(name, value)
        .json(&json!({ "content": "we are looking into it" }))
        .await;
    assert_eq!(public.status_code(), 200);

    // Creator sees only the public comment.
    let (name, value) = bearer(&ada);
    let creator_view = app
        .server
        .get(&format!("/users/tickets/{id}"))
        .add_header(name, value)
        .await;
    let body: Value = creator_view.json();
    let comments = body["data"]["comments"].as_array().unwrap();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0]["content"], "we are looking into it");

    // The agent sees both.
    let (name, value) = bearer(&agent_token);
    let agent_view = app
        .server
        .get(&format!("/users/tickets/{id}"))
        .add_header(name, value)
        .await;
    let body: Value = agent_view.json();
    assert_eq!(body["data"]["comments"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn plain_users_cannot_post_internal_comments() {
    let app = spawn_app().await;
    let (_, ada) = seed_user(&app, "ada@example.com", Role::User).await;
    let id = create_ticket(&app, &ada).await;

    let (name, value) = bearer(&ada);
    let response = app
        .server
        .post(&format!("/users/tickets/{id}/comments"))
        .add_header(name, value)
        .json(&json!({ "content": "please hurry", "is_internal": true }))
        .await;
    assert_eq!(response.status_code(), 200);

    // The flag is ignored for non-staff authors.
    let body: Value = response.json();
    assert_eq!(body["data"]["comments"][0]["is_internal"], false);
}

#[tokio::test]
async fn agent_listings_are_role_gated() {
    let app = spawn_app().await;
    let (_, user) = seed_user(&app, "ada@example.com", Role::User).await;
    let (agent, agent_token) = seed_agent(&app, "agent@example.com").await;
    let (_, admin) = seed_admin(&app, "root@example.com").await;

    let id = create_ticket(&app, &user).await;
    create_ticket(&app, &user).await;

    let (name, value) = bearer(&user);
    let forbidden = app
        .server
        .get("/users/agent/tickets/all")
        .add_header(name, value)
        .await;
    assert_eq!(forbidden.status_code(), 403);

    let (name, value) = bearer(&agent_token);
    let all = app
        .server
        .get("/users/agent/tickets/all")
        .add_header(name, value)
        .await;
    assert_eq!(all.status_code(), 200);
    let body: Value = all.json();
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    // Move one ticket out of open and assign it to the agent.
    let (name, value) = bearer(&admin);
    app.server
        .patch(&format!("/users/tickets/{id}"))
        .add_header(name, value)
        .json(&json!({ "status": "in_progress", "assigned_to": agent.id }))
        .await;

    let (name, value) = bearer(&agent_token);
    let open = app
        .server
        .get("/users/agent/tickets/open")
        .add_header(name, value)
        .await;
    let body: Value = open.json();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (name, value) = bearer(&agent_token);
    let assigned = app
        .server
        .get("/users/agent/tickets/assigned")
        .add_header(name, value)
        .await;
    let body: Value = assigned.json();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["id"], id.to_string());
}

#[tokio::test]
async fn missing_ticket_is_404() {
    let app = spawn_app().await;
    let (_, token) = seed_user(&app, "ada@example.com", Role::User).await;

    let (name, value) = bearer(&token);
    let response = app
        .server
        .get(&format!("/users/tickets/{}", Uuid::new_v4()))
        .add_header(name, value)
        .await;
    assert_eq!(response.status_code(), 404);
    let body: Value = response.json();
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn json_attachment_metadata_is_persisted() {
    let app = spawn_app().await;
    let (_, token) = seed_user(&app, "ada@example.com", Role::User).await;

    let (name, value) = bearer(&token);
    let response = app
        .server
        .post("/users/tickets")
        .add_header(name, value)
        .json(&json!({
            "title": "Crash report",
            "description": "See attached log",
            "category": "bug",
            "attachments": [{
                "filename": "crash.log",
                "path": "uploads/crash.log",
                "mimetype": "text/plain",
            }],
        }))
        .await;

    assert_eq!(response.status_code(), 201);
    let body: Value = response.json();
    assert_eq!(body["data"]["attachments"][0]["filename"], "crash.log");
}

#[tokio::test]
async fn multipart_creation_merges_uploaded_files() {
    let app = spawn_app().await;
    let (_, token) = seed_user(&app, "ada@example.com", Role::User).await;

    let ticket = json!({
        "title": "Scanner jam",
        "description": "Paper stuck, log attached",
        "category": "technical",
    });
    let boundary = "ticket-form-boundary";
    let body = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"ticket\"\r\n\r\n\
         {ticket}\r\n\
         --{boundary}\r\n\
         Content-Disposition: form-data; name=\"attachments\"; filename=\"scan.log\"\r\n\
         Content-Type: text/plain\r\n\r\n\
         feed error at 09:14\r\n\
         --{boundary}--\r\n"
    );

    let (name, value) = bearer(&token);
    let response = app
        .server
        .post("/users/tickets")
        .add_header(name, value)
        .content_type(&format!("multipart/form-data; boundary={boundary}"))
        .bytes(body.into_bytes().into())
        .await;

    assert_eq!(response.status_code(), 201, "create failed: {}", response.text());
    let body: Value = response.json();
    let attachments = body["data"]["attachments"].as_array().unwrap();
    assert_eq!(attachments.len(), 1);
    assert_eq!(attachments[0]["filename"], "scan.log");
    assert_eq!(attachments[0]["mimetype"], "text/plain");
    assert!(attachments[0]["path"]
        .as_str()
        .unwrap()
        .ends_with("scan.log"));
}

#[tokio::test]
async fn creator_is_immutable_through_updates() {
    let app = spawn_app().await;
    let (user, token) = seed_user(&app, "ada@example.com", Role::User).await;
    let id = create_ticket(&app, &token).await;

    let (name, value) = bearer(&token);
    let response = app
        .server
        .patch(&format!("/users/tickets/{id}"))
        .add_header(name, value)
        .json(&json!({ "title": "Renamed", "creator": Uuid::new_v4() }))
        .await;
    assert_eq!(response.status_code(), 200);

    let body: Value = response.json();
    assert_eq!(body["data"]["title"], "Renamed");
    assert_eq!(body["data"]["creator"], user.id.to_string());
}
