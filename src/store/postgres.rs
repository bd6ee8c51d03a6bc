//! Postgres store backend.
//!
//! Documents embedded in a ticket or article (comments, attachments,
//! escalation, resolution) live in JSONB columns; closed enumerations are
//! stored as TEXT. The two operations that are racy as read-then-write
//! sequences run as a single conditional UPDATE (like toggle) or inside a
//! row-locking transaction (last-admin delete).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{Store, StoreError};
use crate::config;
use crate::models::{
    Article, ArticleComment, ArticlePatch, Attachment, Escalation, NewArticle, NewTicket, NewUser,
    Resolution, Role, Ticket, TicketComment, TicketFilter, TicketPatch, TicketStatus, User,
    UserPatch,
};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and run pending migrations.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let db_config = &config::config().database;
        let pool = PgPoolOptions::new()
            .max_connections(db_config.max_connections)
            .acquire_timeout(Duration::from_secs(db_config.connect_timeout_secs))
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Unavailable(format!("migration failed: {e}")))?;

        Ok(Self { pool })
    }
}

/// Serialize a unit-variant enum to its wire string for a TEXT column.
fn to_db_enum<T: Serialize>(value: &T) -> Result<String, StoreError> {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => Ok(s),
        other => Err(StoreError::Corrupt(format!(
            "expected string-serializable enum, got {other:?}"
        ))),
    }
}

fn from_db_enum<T: DeserializeOwned>(column: &str, s: &str) -> Result<T, StoreError> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|_| StoreError::Corrupt(format!("unrecognized {column} value: {s}")))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    password_hash: String,
    role: String,
    phone_number: Option<String>,
    department: Option<String>,
    specializations: Json<Vec<String>>,
    availability: Option<String>,
    is_active: bool,
    last_login: Option<DateTime<Utc>>,
    refresh_token: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, StoreError> {
        Ok(User {
            id: row.id,
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            role: from_db_enum("role", &row.role)?,
            phone_number: row.phone_number,
            department: row.department,
            specializations: row.specializations.0,
            availability: row
                .availability
                .as_deref()
                .map(|s| from_db_enum("availability", s))
                .transpose()?,
            is_active: row.is_active,
            last_login: row.last_login,
            refresh_token: row.refresh_token,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct TicketRow {
    id: Uuid,
    title: String,
    description: String,
    category: String,
    priority: String,
    status: String,
    creator: Uuid,
    assigned_to: Option<Uuid>,
    comments: Json<Vec<TicketComment>>,
    attachments: Json<Vec<Attachment>>,
    resolution: Option<Json<Resolution>>,
    escalation: Option<Json<Escalation>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = StoreError;

    fn try_from(row: TicketRow) -> Result<Self, StoreError> {
        Ok(Ticket {
            id: row.id,
            title: row.title,
            description: row.description,
            category: from_db_enum("category", &row.category)?,
            priority: from_db_enum("priority", &row.priority)?,
            status: from_db_enum("status", &row.status)?,
            creator: row.creator,
            assigned_to: row.assigned_to,
            comments: row.comments.0,
            attachments: row.attachments.0,
            resolution: row.resolution.map(|j| j.0),
            escalation: row.escalation.map(|j| j.0),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct ArticleRow {
    id: Uuid,
    title: String,
    content: String,
    author: Uuid,
    is_public: bool,
    article_type: String,
    likes: i64,
    liked_by: Vec<Uuid>,
    comments: Json<Vec<ArticleComment>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ArticleRow> for Article {
    type Error = StoreError;

    fn try_from(row: ArticleRow) -> Result<Self, StoreError> {
        Ok(Article {
            id: row.id,
            title: row.title,
            content: row.content,
            author: row.author,
            is_public: row.is_public,
            article_type: from_db_enum("article_type", &row.article_type)?,
            likes: row.likes,
            liked_by: row.liked_by,
            comments: row.comments.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const USER_COLUMNS: &str = "id, name, email, password_hash, role, phone_number, department, \
                            specializations, availability, is_active, last_login, refresh_token, \
                            created_at, updated_at";

const TICKET_COLUMNS: &str = "id, title, description, category, priority, status, creator, \
                              assigned_to, comments, attachments, resolution, escalation, \
                              created_at, updated_at";

const ARTICLE_COLUMNS: &str = "id, title, content, author, is_public, article_type, likes, \
                               liked_by, comments, created_at, updated_at";

impl PgStore {
    async fn write_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE users SET name = $2, email = $3, password_hash = $4, role = $5, \
             phone_number = $6, department = $7, specializations = $8, availability = $9, \
             is_active = $10, updated_at = $11 WHERE id = $1",
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(&user.phone_number)
        .bind(&user.department)
        .bind(Json(&user.specializations))
        .bind(user.availability.map(|a| a.as_str()))
        .bind(user.is_active)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::DuplicateEmail
            } else {
                e.into()
            }
        })?;
        Ok(())
    }

    async fn write_ticket(&self, ticket: &Ticket) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE tickets SET title = $2, description = $3, category = $4, priority = $5, \
             status = $6, assigned_to = $7, comments = $8, attachments = $9, resolution = $10, \
             escalation = $11, updated_at = $12 WHERE id = $1",
        )
        .bind(ticket.id)
        .bind(&ticket.title)
        .bind(&ticket.description)
        .bind(to_db_enum(&ticket.category)?)
        .bind(to_db_enum(&ticket.priority)?)
        .bind(ticket.status.as_str())
        .bind(ticket.assigned_to)
        .bind(Json(&ticket.comments))
        .bind(Json(&ticket.attachments))
        .bind(ticket.resolution.as_ref().map(Json))
        .bind(ticket.escalation.as_ref().map(Json))
        .bind(ticket.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn health(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn create_user(&self, new: NewUser) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (id, name, email, password_hash, role, phone_number, department, \
             specializations, availability, is_active, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, TRUE, now(), now()) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&new.name)
        .bind(new.email.to_lowercase())
        .bind(&new.password_hash)
        .bind(new.role.as_str())
        .bind(&new.phone_number)
        .bind(&new.department)
        .bind(Json(&new.specializations))
        .bind(new.availability.map(|a| a.as_str()))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::DuplicateEmail
            } else {
                e.into()
            }
        })?;
        row.try_into()
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(User::try_from)
        .transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email.to_lowercase())
        .fetch_optional(&self.pool)
        .await?
        .map(User::try_from)
        .transpose()
    }

    async fn find_user_by_refresh_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE refresh_token = $1"
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?
        .map(User::try_from)
        .transpose()
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(User::try_from)
        .collect()
    }

    async fn list_users_by_role(&self, role: Role) -> Result<Vec<User>, StoreError> {
        sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE role = $1 ORDER BY name"
        ))
        .bind(role.as_str())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(User::try_from)
        .collect()
    }

    async fn update_user(&self, id: Uuid, patch: UserPatch) -> Result<Option<User>, StoreError> {
        let Some(mut user) = self.get_user(id).await? else {
            return Ok(None);
        };
        patch.apply(&mut user);
        self.write_user(&user).await?;
        Ok(Some(user))
    }

    async fn store_refresh_token(
        &self,
        id: Uuid,
        token: Option<String>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET refresh_token = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_logged_in(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET last_login = now(), updated_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_user(&self, id: Uuid) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let target: Option<(String,)> =
            sqlx::query_as("SELECT role FROM users WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((role,)) = target else {
            return Err(StoreError::NotFound(format!("No user found with id: {id}")));
        };

        if role == Role::Admin.as_str() {
            // Lock all admin rows so two concurrent deletes cannot both see
            // a count above one.
            let admins: Vec<(Uuid,)> =
                sqlx::query_as("SELECT id FROM users WHERE role = $1 FOR UPDATE")
                    .bind(Role::Admin.as_str())
                    .fetch_all(&mut *tx)
                    .await?;
            if admins.len() <= 1 {
                return Err(StoreError::LastAdmin);
            }
        }

        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn create_ticket(&self, new: NewTicket) -> Result<Ticket, StoreError> {
        let row = sqlx::query_as::<_, TicketRow>(&format!(
            "INSERT INTO tickets (id, title, description, category, priority, status, creator, \
             comments, attachments, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, '[]'::jsonb, $8, now(), now()) \
             RETURNING {TICKET_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&new.title)
        .bind(&new.description)
        .bind(to_db_enum(&new.category)?)
        .bind(to_db_enum(&new.priority)?)
        .bind(TicketStatus::Open.as_str())
        .bind(new.creator)
        .bind(Json(&new.attachments))
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn get_ticket(&self, id: Uuid) -> Result<Option<Ticket>, StoreError> {
        sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Ticket::try_from)
        .transpose()
    }

    async fn list_tickets(&self, filter: TicketFilter) -> Result<Vec<Ticket>, StoreError> {
        let (predicate, bound_id) = match filter {
            TicketFilter::All => ("TRUE", None),
            TicketFilter::Open => ("status = 'open'", None),
            TicketFilter::AssignedTo(id) => ("assigned_to = $1", Some(id)),
            TicketFilter::OwnedBy(id) => ("creator = $1", Some(id)),
            TicketFilter::OwnedOrAssigned(id) => ("(creator = $1 OR assigned_to = $1)", Some(id)),
        };
        let sql = format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE {predicate} ORDER BY created_at DESC"
        );
        let mut query = sqlx::query_as::<_, TicketRow>(&sql);
        if let Some(id) = bound_id {
            query = query.bind(id);
        }
        query
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Ticket::try_from)
            .collect()
    }

    async fn update_ticket(
        &self,
        id: Uuid,
        patch: TicketPatch,
    ) -> Result<Option<Ticket>, StoreError> {
        let Some(mut ticket) = self.get_ticket(id).await? else {
            return Ok(None);
        };
        patch.apply(&mut ticket);
        self.write_ticket(&ticket).await?;
        Ok(Some(ticket))
    }

    async fn add_ticket_comment(
        &self,
        id: Uuid,
        comment: TicketComment,
    ) -> Result<Option<Ticket>, StoreError> {
        // JSONB concatenation appends in one statement.
        sqlx::query_as::<_, TicketRow>(&format!(
            "UPDATE tickets SET comments = comments || $2, updated_at = now() \
             WHERE id = $1 RETURNING {TICKET_COLUMNS}"
        ))
        .bind(id)
        .bind(Json(vec![comment]))
        .fetch_optional(&self.pool)
        .await?
        .map(Ticket::try_from)
        .transpose()
    }

    async fn escalate_ticket(
        &self,
        id: Uuid,
        escalation: Escalation,
    ) -> Result<Option<Ticket>, StoreError> {
        sqlx::query_as::<_, TicketRow>(&format!(
            "UPDATE tickets SET status = $2, escalation = $3, updated_at = now() \
             WHERE id = $1 RETURNING {TICKET_COLUMNS}"
        ))
        .bind(id)
        .bind(TicketStatus::Escalated.as_str())
        .bind(Json(&escalation))
        .fetch_optional(&self.pool)
        .await?
        .map(Ticket::try_from)
        .transpose()
    }

    async fn create_article(&self, new: NewArticle) -> Result<Article, StoreError> {
        let row = sqlx::query_as::<_, ArticleRow>(&format!(
            "INSERT INTO articles (id, title, content, author, is_public, article_type, likes, \
             liked_by, comments, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, 0, '{{}}', '[]'::jsonb, now(), now()) \
             RETURNING {ARTICLE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&new.title)
        .bind(&new.content)
        .bind(new.author)
        .bind(new.is_public)
        .bind(to_db_enum(&new.article_type)?)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn get_article(&self, id: Uuid) -> Result<Option<Article>, StoreError> {
        sqlx::query_as::<_, ArticleRow>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Article::try_from)
        .transpose()
    }

    async fn list_articles(&self) -> Result<Vec<Article>, StoreError> {
        sqlx::query_as::<_, ArticleRow>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Article::try_from)
        .collect()
    }

    async fn update_article(
        &self,
        id: Uuid,
        patch: ArticlePatch,
    ) -> Result<Option<Article>, StoreError> {
        let Some(mut article) = self.get_article(id).await? else {
            return Ok(None);
        };
        patch.apply(&mut article);
        sqlx::query(
            "UPDATE articles SET title = $2, content = $3, is_public = $4, article_type = $5, \
             updated_at = $6 WHERE id = $1",
        )
        .bind(article.id)
        .bind(&article.title)
        .bind(&article.content)
        .bind(article.is_public)
        .bind(to_db_enum(&article.article_type)?)
        .bind(article.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(Some(article))
    }

    async fn delete_article(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM articles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn toggle_like(&self, id: Uuid, user: Uuid) -> Result<Option<Article>, StoreError> {
        // Single conditional UPDATE: membership test, count, and set change
        // all evaluate against the same row version, so concurrent duplicate
        // toggles serialize instead of double-counting.
        sqlx::query_as::<_, ArticleRow>(&format!(
            "UPDATE articles SET \
               likes = CASE WHEN $2 = ANY(liked_by) THEN likes - 1 ELSE likes + 1 END, \
               liked_by = CASE WHEN $2 = ANY(liked_by) THEN array_remove(liked_by, $2) \
                               ELSE array_append(liked_by, $2) END, \
               updated_at = now() \
             WHERE id = $1 RETURNING {ARTICLE_COLUMNS}"
        ))
        .bind(id)
        .bind(user)
        .fetch_optional(&self.pool)
        .await?
        .map(Article::try_from)
        .transpose()
    }

    async fn add_article_comment(
        &self,
        id: Uuid,
        comment: ArticleComment,
    ) -> Result<Option<Article>, StoreError> {
        sqlx::query_as::<_, ArticleRow>(&format!(
            "UPDATE articles SET comments = comments || $2, updated_at = now() \
             WHERE id = $1 RETURNING {ARTICLE_COLUMNS}"
        ))
        .bind(id)
        .bind(Json(vec![comment]))
        .fetch_optional(&self.pool)
        .await?
        .map(Article::try_from)
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Priority, TicketCategory};

    #[test]
    fn enum_wire_format_matches_columns() {
        assert_eq!(to_db_enum(&TicketCategory::FeatureRequest).unwrap(), "feature_request");
        assert_eq!(to_db_enum(&Priority::Urgent).unwrap(), "urgent");
        let parsed: TicketCategory = from_db_enum("category", "billing").unwrap();
        assert_eq!(parsed, TicketCategory::Billing);
    }

    #[test]
    fn unknown_enum_value_is_corrupt() {
        let result: Result<TicketCategory, _> = from_db_enum("category", "jousting");
        assert!(matches!(result, Err(StoreError::Corrupt(_))));
    }
}
