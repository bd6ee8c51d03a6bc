//! Durable state behind an object-safe async trait.
//!
//! Two backends: Postgres for deployments and an in-memory store for tests
//! and local development. Handlers only see `Arc<dyn Store>`, so the racy
//! read-modify-write sequences of a naive implementation stay contained in
//! the backends, where they are done atomically.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Article, ArticleComment, ArticlePatch, Escalation, NewArticle, NewTicket, NewUser, Role,
    Ticket, TicketComment, TicketFilter, TicketPatch, User, UserPatch,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("email already registered")]
    DuplicateEmail,

    #[error("cannot delete the last admin user")]
    LastAdmin,

    #[error("{0}")]
    NotFound(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn health(&self) -> Result<(), StoreError>;

    // Users
    async fn create_user(&self, new: NewUser) -> Result<User, StoreError>;
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_user_by_refresh_token(&self, token: &str) -> Result<Option<User>, StoreError>;
    async fn list_users(&self) -> Result<Vec<User>, StoreError>;
    async fn list_users_by_role(&self, role: Role) -> Result<Vec<User>, StoreError>;
    async fn update_user(&self, id: Uuid, patch: UserPatch) -> Result<Option<User>, StoreError>;
    async fn store_refresh_token(
        &self,
        id: Uuid,
        token: Option<String>,
    ) -> Result<(), StoreError>;
    async fn mark_logged_in(&self, id: Uuid) -> Result<(), StoreError>;
    /// Deletes a user. Fails with [`StoreError::LastAdmin`] if the target is
    /// the only remaining admin; the check and delete are atomic.
    async fn delete_user(&self, id: Uuid) -> Result<(), StoreError>;

    // Tickets
    async fn create_ticket(&self, new: NewTicket) -> Result<Ticket, StoreError>;
    async fn get_ticket(&self, id: Uuid) -> Result<Option<Ticket>, StoreError>;
    async fn list_tickets(&self, filter: TicketFilter) -> Result<Vec<Ticket>, StoreError>;
    async fn update_ticket(
        &self,
        id: Uuid,
        patch: TicketPatch,
    ) -> Result<Option<Ticket>, StoreError>;
    async fn add_ticket_comment(
        &self,
        id: Uuid,
        comment: TicketComment,
    ) -> Result<Option<Ticket>, StoreError>;
    async fn escalate_ticket(
        &self,
        id: Uuid,
        escalation: Escalation,
    ) -> Result<Option<Ticket>, StoreError>;

    // Articles
    async fn create_article(&self, new: NewArticle) -> Result<Article, StoreError>;
    async fn get_article(&self, id: Uuid) -> Result<Option<Article>, StoreError>;
    async fn list_articles(&self) -> Result<Vec<Article>, StoreError>;
    async fn update_article(
        &self,
        id: Uuid,
        patch: ArticlePatch,
    ) -> Result<Option<Article>, StoreError>;
    async fn delete_article(&self, id: Uuid) -> Result<bool, StoreError>;
    /// Idempotent like toggle keyed on set membership, applied atomically so
    /// `likes` and `liked_by` can never diverge.
    async fn toggle_like(&self, id: Uuid, user: Uuid) -> Result<Option<Article>, StoreError>;
    async fn add_article_comment(
        &self,
        id: Uuid,
        comment: ArticleComment,
    ) -> Result<Option<Article>, StoreError>;
}

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}
