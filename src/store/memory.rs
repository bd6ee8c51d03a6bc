//! In-memory store backend.
//!
//! Backs the integration test suite and local development without a
//! database. Every operation takes the single inner mutex, which makes each
//! trait method atomic by construction.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{Store, StoreError};
use crate::models::{
    Article, ArticleComment, ArticlePatch, Escalation, NewArticle, NewTicket, NewUser, Role,
    Ticket, TicketComment, TicketFilter, TicketPatch, TicketStatus, User, UserPatch,
};

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    tickets: HashMap<Uuid, Ticket>,
    articles: HashMap<Uuid, Article>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn health(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn create_user(&self, new: NewUser) -> Result<User, StoreError> {
        let mut inner = self.inner.lock().await;
        let email = new.email.to_lowercase();
        if inner.users.values().any(|u| u.email == email) {
            return Err(StoreError::DuplicateEmail);
        }
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: new.name,
            email,
            password_hash: new.password_hash,
            role: new.role,
            phone_number: new.phone_number,
            department: new.department,
            specializations: new.specializations,
            availability: new.availability,
            is_active: true,
            last_login: None,
            refresh_token: None,
            created_at: now,
            updated_at: now,
        };
        inner.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.lock().await;
        let email = email.to_lowercase();
        Ok(inner.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_refresh_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .users
            .values()
            .find(|u| u.refresh_token.as_deref() == Some(token))
            .cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let inner = self.inner.lock().await;
        let mut users: Vec<User> = inner.users.values().cloned().collect();
        users.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(users)
    }

    async fn list_users_by_role(&self, role: Role) -> Result<Vec<User>, StoreError> {
        let mut users = self.list_users().await?;
        users.retain(|u| u.role == role);
        Ok(users)
    }

    async fn update_user(&self, id: Uuid, patch: UserPatch) -> Result<Option<User>, StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(email) = &patch.email {
            let email = email.to_lowercase();
            if inner
                .users
                .values()
                .any(|u| u.id != id && u.email == email)
            {
                return Err(StoreError::DuplicateEmail);
            }
        }
        Ok(inner.users.get_mut(&id).map(|user| {
            patch.apply(user);
            user.clone()
        }))
    }

    async fn store_refresh_token(
        &self,
        id: Uuid,
        token: Option<String>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(user) = inner.users.get_mut(&id) {
            user.refresh_token = token;
        }
        Ok(())
    }

    async fn mark_logged_in(&self, id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(user) = inner.users.get_mut(&id) {
            user.last_login = Some(Utc::now());
        }
        Ok(())
    }

    async fn delete_user(&self, id: Uuid) -> Result<(), StoreError> {
        // Single lock covers the admin count and the removal, so two
        // concurrent deletes cannot both pass the last-admin guard.
        let mut inner = self.inner.lock().await;
        let user = inner
            .users
            .get(&id)
            .ok_or_else(|| StoreError::NotFound(format!("No user found with id: {id}")))?;
        if user.role == Role::Admin {
            let admin_count = inner
                .users
                .values()
                .filter(|u| u.role == Role::Admin)
                .count();
            if admin_count <= 1 {
                return Err(StoreError::LastAdmin);
            }
        }
        inner.users.remove(&id);
        Ok(())
    }

    async fn create_ticket(&self, new: NewTicket) -> Result<Ticket, StoreError> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();
        let ticket = Ticket {
            id: Uuid::new_v4(),
            title: new.title,
            description: new.description,
            category: new.category,
            priority: new.priority,
            status: TicketStatus::Open,
            creator: new.creator,
            assigned_to: None,
            comments: vec![],
            attachments: new.attachments,
            resolution: None,
            escalation: None,
            created_at: now,
            updated_at: now,
        };
        inner.tickets.insert(ticket.id, ticket.clone());
        Ok(ticket)
    }

    async fn get_ticket(&self, id: Uuid) -> Result<Option<Ticket>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.tickets.get(&id).cloned())
    }

    async fn list_tickets(&self, filter: TicketFilter) -> Result<Vec<Ticket>, StoreError> {
        let inner = self.inner.lock().await;
        let mut tickets: Vec<Ticket> = inner
            .tickets
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        tickets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tickets)
    }

    async fn update_ticket(
        &self,
        id: Uuid,
        patch: TicketPatch,
    ) -> Result<Option<Ticket>, StoreError> {
        let mut inner = self.inner.lock().await;
        Ok(inner.tickets.get_mut(&id).map(|ticket| {
            patch.apply(ticket);
            ticket.clone()
        }))
    }

    async fn add_ticket_comment(
        &self,
        id: Uuid,
        comment: TicketComment,
    ) -> Result<Option<Ticket>, StoreError> {
        let mut inner = self.inner.lock().await;
        Ok(inner.tickets.get_mut(&id).map(|ticket| {
            ticket.comments.push(comment);
            ticket.updated_at = Utc::now();
            ticket.clone()
        }))
    }

    async fn escalate_ticket(
        &self,
        id: Uuid,
        escalation: Escalation,
    ) -> Result<Option<Ticket>, StoreError> {
        let mut inner = self.inner.lock().await;
        Ok(inner.tickets.get_mut(&id).map(|ticket| {
            ticket.status = TicketStatus::Escalated;
            ticket.escalation = Some(escalation);
            ticket.updated_at = Utc::now();
            ticket.clone()
        }))
    }

    async fn create_article(&self, new: NewArticle) -> Result<Article, StoreError> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();
        let article = Article {
            id: Uuid::new_v4(),
            title: new.title,
            content: new.content,
            author: new.author,
            is_public: new.is_public,
            article_type: new.article_type,
            likes: 0,
            liked_by: vec![],
            comments: vec![],
            created_at: now,
            updated_at: now,
        };
        inner.articles.insert(article.id, article.clone());
        Ok(article)
    }

    async fn get_article(&self, id: Uuid) -> Result<Option<Article>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.articles.get(&id).cloned())
    }

    async fn list_articles(&self) -> Result<Vec<Article>, StoreError> {
        let inner = self.inner.lock().await;
        let mut articles: Vec<Article> = inner.articles.values().cloned().collect();
        articles.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(articles)
    }

    async fn update_article(
        &self,
        id: Uuid,
        patch: ArticlePatch,
    ) -> Result<Option<Article>, StoreError> {
        let mut inner = self.inner.lock().await;
        Ok(inner.articles.get_mut(&id).map(|article| {
            patch.apply(article);
            article.clone()
        }))
    }

    async fn delete_article(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        Ok(inner.articles.remove(&id).is_some())
    }

    async fn toggle_like(&self, id: Uuid, user: Uuid) -> Result<Option<Article>, StoreError> {
        // Membership test, count, and set mutation all happen under one
        // lock; a concurrent duplicate toggle serializes into like+unlike.
        let mut inner = self.inner.lock().await;
        Ok(inner.articles.get_mut(&id).map(|article| {
            match article.liked_by.iter().position(|u| *u == user) {
                Some(idx) => {
                    article.liked_by.remove(idx);
                    article.likes -= 1;
                }
                None => {
                    article.liked_by.push(user);
                    article.likes += 1;
                }
            }
            article.updated_at = Utc::now();
            article.clone()
        }))
    }

    async fn add_article_comment(
        &self,
        id: Uuid,
        comment: ArticleComment,
    ) -> Result<Option<Article>, StoreError> {
        let mut inner = self.inner.lock().await;
        Ok(inner.articles.get_mut(&id).map(|article| {
            article.comments.push(comment);
            article.updated_at = Utc::now();
            article.clone()
        }))
    }
}
