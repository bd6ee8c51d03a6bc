//! Knowledge-base articles: staff-authored content that any authenticated
//! user can read, like, and comment on.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::ApiError;
use crate::handlers::util::{validate_max_len, validate_required, FieldErrors};
use crate::middleware::{ApiResponse, ApiResult, CurrentUser};
use crate::models::{Article, ArticleComment, ArticlePatch, ArticleType, NewArticle, User};
use crate::store::AppState;

fn default_public() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct CreateArticleRequest {
    pub title: String,
    pub content: String,
    #[serde(default = "default_public")]
    pub is_public: bool,
    #[serde(default, rename = "type")]
    pub article_type: ArticleType,
}

#[derive(Debug, Deserialize)]
pub struct UpdateArticleRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub is_public: Option<bool>,
    #[serde(rename = "type")]
    pub article_type: Option<ArticleType>,
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub content: String,
}

fn require_staff(user: &User, action: &str) -> Result<(), ApiError> {
    if user.role.is_agent() {
        Ok(())
    } else {
        Err(ApiError::forbidden(format!(
            "Not authorized to {action} articles"
        )))
    }
}

async fn load_article(state: &AppState, id: Uuid) -> Result<Article, ApiError> {
    state
        .store
        .get_article(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("No article found with id: {id}")))
}

/// GET /articles.
pub async fn list(State(state): State<AppState>) -> ApiResult<Vec<Article>> {
    let articles = state.store.list_articles().await?;
    Ok(ApiResponse::success(articles))
}

/// GET /articles/:id.
pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Article> {
    let article = load_article(&state, id).await?;
    Ok(ApiResponse::success(article))
}

/// POST /articles (staff only).
pub async fn create(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<CreateArticleRequest>,
) -> ApiResult<Article> {
    require_staff(&user, "create")?;

    let mut errors = FieldErrors::new();
    errors.check("title", validate_required(&payload.title, "Title"));
    errors.check("title", validate_max_len(&payload.title, 100, "Title"));
    errors.check("content", validate_required(&payload.content, "Content"));
    errors.into_result()?;

    let article = state
        .store
        .create_article(NewArticle {
            title: payload.title.trim().to_string(),
            content: payload.content,
            author: user.id,
            is_public: payload.is_public,
            article_type: payload.article_type,
        })
        .await?;

    tracing::info!(article = %article.id, author = %user.id, "article created");
    Ok(ApiResponse::created(article))
}

/// PUT /articles/:id (staff only).
pub async fn update(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateArticleRequest>,
) -> ApiResult<Article> {
    require_staff(&user, "update")?;

    let mut errors = FieldErrors::new();
    if let Some(title) = &payload.title {
        errors.check("title", validate_required(title, "Title"));
        errors.check("title", validate_max_len(title, 100, "Title"));
    }
    if let Some(content) = &payload.content {
        errors.check("content", validate_required(content, "Content"));
    }
    errors.into_result()?;

    let article = state
        .store
        .update_article(
            id,
            ArticlePatch {
                title: payload.title.map(|t| t.trim().to_string()),
                content: payload.content,
                is_public: payload.is_public,
                article_type: payload.article_type,
            },
        )
        .await?
        .ok_or_else(|| ApiError::not_found(format!("No article found with id: {id}")))?;

    Ok(ApiResponse::success(article))
}

/// DELETE /articles/:id (staff only).
pub async fn delete(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Value> {
    require_staff(&user, "delete")?;

    if !state.store.delete_article(id).await? {
        return Err(ApiError::not_found(format!("No article found with id: {id}")));
    }
    Ok(ApiResponse::success(json!({})))
}

/// POST /articles/:id/like. Toggles the caller's like; the store keeps the
/// count and membership set consistent under concurrent toggles.
pub async fn toggle_like(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Article> {
    let article = state
        .store
        .toggle_like(id, user.id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("No article found with id: {id}")))?;

    Ok(ApiResponse::success(article))
}

/// POST /articles/:id/comments.
pub async fn add_comment(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CommentRequest>,
) -> ApiResult<Article> {
    let mut errors = FieldErrors::new();
    errors.check("content", validate_required(&payload.content, "Comment content"));
    errors.into_result()?;

    let comment = ArticleComment {
        id: Uuid::new_v4(),
        user: user.id,
        content: payload.content,
        created_at: Utc::now(),
    };

    let article = state
        .store
        .add_article_comment(id, comment)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("No article found with id: {id}")))?;

    Ok(ApiResponse::success(article))
}
