//! Ticket lifecycle: create (JSON or multipart with attachments), read with
//! ownership checks, guarded status transitions, comments, and escalation.

use axum::extract::{FromRequest, Multipart, Path, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::{Extension, Json};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::config;
use crate::error::ApiError;
use crate::handlers::util::{validate_max_len, validate_required, FieldErrors};
use crate::middleware::{ApiResponse, ApiResult, CurrentUser};
use crate::models::{
    Attachment, Escalation, NewTicket, Priority, Resolution, Ticket, TicketCategory,
    TicketComment, TicketFilter, TicketPatch, TicketStatus,
};
use crate::store::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    pub title: String,
    pub description: String,
    pub category: TicketCategory,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTicketRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<TicketCategory>,
    pub priority: Option<Priority>,
    pub status: Option<TicketStatus>,
    pub assigned_to: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub content: String,
    #[serde(default)]
    pub is_internal: bool,
}

#[derive(Debug, Deserialize)]
pub struct EscalateRequest {
    pub reason: String,
}

fn validate_ticket_fields(title: &str, description: &str) -> Result<(), ApiError> {
    let mut errors = FieldErrors::new();
    errors.check("title", validate_required(title, "Title"));
    errors.check("title", validate_max_len(title, 100, "Title"));
    errors.check(
        "description",
        validate_required(description, "Description"),
    );
    errors.into_result()
}

/// POST /users/tickets. Accepts either a JSON body or `multipart/form-data` with a
/// `ticket` JSON field plus any number of `attachments` file fields.
pub async fn create(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    request: Request,
) -> ApiResult<Ticket> {
    let payload = extract_create_payload(&state, request).await?;
    validate_ticket_fields(&payload.title, &payload.description)?;

    let ticket = state
        .store
        .create_ticket(NewTicket {
            title: payload.title.trim().to_string(),
            description: payload.description,
            category: payload.category,
            priority: payload.priority,
            creator: user.id,
            attachments: payload.attachments,
        })
        .await?;

    tracing::info!(ticket = %ticket.id, creator = %user.id, "ticket created");
    Ok(ApiResponse::created(ticket))
}

async fn extract_create_payload(
    state: &AppState,
    request: Request,
) -> Result<CreateTicketRequest, ApiError> {
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.starts_with("multipart/form-data"))
        .unwrap_or(false);

    if !is_multipart {
        let Json(payload) = Json::<CreateTicketRequest>::from_request(request, state)
            .await
            .map_err(|e| ApiError::bad_request(format!("Invalid ticket payload: {e}")))?;
        return Ok(payload);
    }

    let mut multipart = Multipart::from_request(request, state)
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {e}")))?;

    let mut payload: Option<CreateTicketRequest> = None;
    let mut uploaded = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {e}")))?
    {
        match field.name() {
            Some("ticket") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Invalid ticket field: {e}")))?;
                payload = Some(
                    serde_json::from_str(&text)
                        .map_err(|e| ApiError::bad_request(format!("Invalid ticket JSON: {e}")))?,
                );
            }
            Some("attachments") => {
                let filename = field
                    .file_name()
                    .unwrap_or("attachment")
                    .to_string();
                let mimetype = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Invalid attachment: {e}")))?;
                let path = store_upload(&filename, &bytes).await?;
                uploaded.push(Attachment {
                    filename,
                    path,
                    mimetype,
                });
            }
            _ => {}
        }
    }

    let mut payload =
        payload.ok_or_else(|| ApiError::bad_request("Missing ticket field in form data"))?;
    payload.attachments.extend(uploaded);
    Ok(payload)
}

async fn store_upload(filename: &str, bytes: &[u8]) -> Result<String, ApiError> {
    let dir = &config::config().storage.upload_dir;
    tokio::fs::create_dir_all(dir).await.map_err(|e| {
        tracing::error!("failed to create upload dir {}: {}", dir, e);
        ApiError::internal_server_error("Failed to store attachment")
    })?;

    // Uuid prefix keeps colliding client filenames apart.
    let path = format!("{dir}/{}-{filename}", Uuid::new_v4());
    tokio::fs::write(&path, bytes).await.map_err(|e| {
        tracing::error!("failed to write upload {}: {}", path, e);
        ApiError::internal_server_error("Failed to store attachment")
    })?;
    Ok(path)
}

async fn load_ticket(state: &AppState, id: Uuid) -> Result<Ticket, ApiError> {
    state
        .store
        .get_ticket(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("No ticket found with id: {id}")))
}

/// GET /users/tickets. Plain users see tickets they created; agents also see
/// tickets assigned to them.
pub async fn list_own(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResult<Vec<Ticket>> {
    let filter = if user.role.is_agent() {
        TicketFilter::OwnedOrAssigned(user.id)
    } else {
        TicketFilter::OwnedBy(user.id)
    };
    let tickets = state.store.list_tickets(filter).await?;
    let tickets = tickets
        .into_iter()
        .map(|ticket| ticket.redact_for(&user))
        .collect();
    Ok(ApiResponse::success(tickets))
}

/// GET /users/tickets/:id.
pub async fn get_one(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Ticket> {
    let ticket = load_ticket(&state, id).await?;
    if !ticket.readable_by(&user) {
        return Err(ApiError::forbidden("Not authorized to view this ticket"));
    }
    Ok(ApiResponse::success(ticket.redact_for(&user)))
}

/// PATCH /users/tickets/:id. Status changes go through the transition table;
/// reaching `Resolved` stamps a resolution record. `Escalated` is never a
/// legal target here.
pub async fn update(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateTicketRequest>,
) -> ApiResult<Ticket> {
    let ticket = load_ticket(&state, id).await?;
    if !ticket.updatable_by(&user) {
        return Err(ApiError::forbidden("Not authorized to update this ticket"));
    }

    let mut errors = FieldErrors::new();
    if let Some(title) = &payload.title {
        errors.check("title", validate_required(title, "Title"));
        errors.check("title", validate_max_len(title, 100, "Title"));
    }
    if let Some(description) = &payload.description {
        errors.check("description", validate_required(description, "Description"));
    }
    errors.into_result()?;

    let mut patch = TicketPatch {
        title: payload.title.map(|t| t.trim().to_string()),
        description: payload.description,
        category: payload.category,
        priority: payload.priority,
        assigned_to: payload.assigned_to,
        ..TicketPatch::default()
    };

    if let Some(next) = payload.status {
        if next != ticket.status {
            if !ticket.status.can_transition_to(next) {
                return Err(ApiError::validation_error(
                    format!("Cannot transition ticket from {} to {}", ticket.status, next),
                    None,
                ));
            }
            patch.status = Some(next);
            if next == TicketStatus::Resolved {
                patch.resolution = Some(Resolution {
                    resolved_at: Utc::now(),
                    resolved_by: user.id,
                    feedback: None,
                });
            }
        }
    }

    let updated = state
        .store
        .update_ticket(id, patch)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("No ticket found with id: {id}")))?;

    Ok(ApiResponse::success(updated.redact_for(&user)))
}

/// POST /users/tickets/:id/comments. Internal comments are only honored for staff;
/// a plain user's `is_internal` flag is ignored.
pub async fn add_comment(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CommentRequest>,
) -> ApiResult<Ticket> {
    let mut errors = FieldErrors::new();
    errors.check("content", validate_required(&payload.content, "Comment content"));
    errors.into_result()?;

    let ticket = load_ticket(&state, id).await?;
    if !ticket.readable_by(&user) {
        return Err(ApiError::forbidden(
            "Not authorized to comment on this ticket",
        ));
    }

    let comment = TicketComment {
        id: Uuid::new_v4(),
        user: user.id,
        content: payload.content,
        is_internal: payload.is_internal && user.role.is_agent(),
        created_at: Utc::now(),
    };

    let updated = state
        .store
        .add_ticket_comment(id, comment)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("No ticket found with id: {id}")))?;

    Ok(ApiResponse::success(updated.redact_for(&user)))
}

/// POST /users/tickets/:id/escalate. Only the creator can escalate, and a closed
/// ticket stays closed.
pub async fn escalate(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<EscalateRequest>,
) -> ApiResult<Ticket> {
    let mut errors = FieldErrors::new();
    errors.check("reason", validate_required(&payload.reason, "Escalation reason"));
    errors.into_result()?;

    let ticket = load_ticket(&state, id).await?;
    if ticket.creator != user.id {
        return Err(ApiError::forbidden(
            "Only the ticket creator can escalate it",
        ));
    }
    if ticket.status == TicketStatus::Closed {
        return Err(ApiError::validation_error(
            "Cannot escalate a closed ticket",
            None,
        ));
    }

    let escalation = Escalation {
        reason: payload.reason,
        escalated_at: Utc::now(),
        escalated_by: user.id,
    };

    let updated = state
        .store
        .escalate_ticket(id, escalation)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("No ticket found with id: {id}")))?;

    tracing::info!(ticket = %id, "ticket escalated");
    Ok(ApiResponse::success(updated.redact_for(&user)))
}

/// GET /users/agent/tickets/all (staff only).
pub async fn list_all(State(state): State<AppState>) -> ApiResult<Vec<Ticket>> {
    let tickets = state.store.list_tickets(TicketFilter::All).await?;
    Ok(ApiResponse::success(tickets))
}

/// GET /users/agent/tickets/open (staff only).
pub async fn list_open(State(state): State<AppState>) -> ApiResult<Vec<Ticket>> {
    let tickets = state.store.list_tickets(TicketFilter::Open).await?;
    Ok(ApiResponse::success(tickets))
}

/// GET /users/agent/tickets/assigned (staff only).
pub async fn list_assigned(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResult<Vec<Ticket>> {
    let tickets = state
        .store
        .list_tickets(TicketFilter::AssignedTo(user.id))
        .await?;
    Ok(ApiResponse::success(tickets))
}
