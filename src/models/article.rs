use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArticleType {
    Regular,
    Daily,
}

impl Default for ArticleType {
    fn default() -> Self {
        ArticleType::Regular
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleComment {
    pub id: Uuid,
    pub user: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Knowledge-base article. Invariant: `likes` always equals
/// `liked_by.len()`; the store maintains the pairing with a single atomic
/// toggle so concurrent double-toggles cannot skew the count.
#[derive(Debug, Clone, Serialize)]
pub struct Article {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub author: Uuid,
    pub is_public: bool,
    #[serde(rename = "type")]
    pub article_type: ArticleType,
    pub likes: i64,
    pub liked_by: Vec<Uuid>,
    pub comments: Vec<ArticleComment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewArticle {
    pub title: String,
    pub content: String,
    pub author: Uuid,
    pub is_public: bool,
    pub article_type: ArticleType,
}

#[derive(Debug, Clone, Default)]
pub struct ArticlePatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub is_public: Option<bool>,
    pub article_type: Option<ArticleType>,
}

impl ArticlePatch {
    pub fn apply(&self, article: &mut Article) {
        if let Some(title) = &self.title {
            article.title = title.clone();
        }
        if let Some(content) = &self.content {
            article.content = content.clone();
        }
        if let Some(is_public) = self.is_public {
            article.is_public = is_public;
        }
        if let Some(article_type) = self.article_type {
            article.article_type = article_type;
        }
        article.updated_at = Utc::now();
    }
}
