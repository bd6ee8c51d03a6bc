use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::user::{Role, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketCategory {
    Billing,
    Technical,
    General,
    FeatureRequest,
    Bug,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

/// Ticket lifecycle state. Transitions through the generic update path are
/// restricted to the table in [`TicketStatus::can_transition_to`];
/// `Escalated` is only reachable through the dedicated escalate operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
    Escalated,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::InProgress => "in_progress",
            TicketStatus::Resolved => "resolved",
            TicketStatus::Closed => "closed",
            TicketStatus::Escalated => "escalated",
        }
    }

    /// Legal transitions for the generic update path. Self-transitions are
    /// treated as no-ops by callers and are not listed here.
    pub fn can_transition_to(self, next: TicketStatus) -> bool {
        use TicketStatus::*;
        matches!(
            (self, next),
            (Open, InProgress)
                | (InProgress, Resolved)
                | (InProgress, Open)
                | (Resolved, Closed)
                | (Resolved, InProgress)
                | (Escalated, InProgress)
        )
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comment embedded in a ticket. Internal comments are agent-to-agent notes
/// and are filtered out before a ticket is shown to its creator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketComment {
    pub id: Uuid,
    pub user: Uuid,
    pub content: String,
    pub is_internal: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub path: String,
    pub mimetype: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionFeedback {
    pub rating: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    pub resolved_at: DateTime<Utc>,
    pub resolved_by: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<ResolutionFeedback>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Escalation {
    pub reason: String,
    pub escalated_at: DateTime<Utc>,
    pub escalated_by: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct Ticket {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: TicketCategory,
    pub priority: Priority,
    pub status: TicketStatus,
    pub creator: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<Uuid>,
    pub comments: Vec<TicketComment>,
    pub attachments: Vec<Attachment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalation: Option<Escalation>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    /// Read access: the creator, the assigned agent, or an admin.
    pub fn readable_by(&self, user: &User) -> bool {
        self.creator == user.id || self.assigned_to == Some(user.id) || user.role == Role::Admin
    }

    /// Update access mirrors read access.
    pub fn updatable_by(&self, user: &User) -> bool {
        self.readable_by(user)
    }

    /// Strip internal comments for readers without staff access. Assignees
    /// are agents, so role is the only thing that matters here.
    pub fn redact_for(mut self, viewer: &User) -> Ticket {
        if !viewer.role.is_agent() {
            self.comments.retain(|c| !c.is_internal);
        }
        self
    }
}

#[derive(Debug, Clone)]
pub struct NewTicket {
    pub title: String,
    pub description: String,
    pub category: TicketCategory,
    pub priority: Priority,
    pub creator: Uuid,
    pub attachments: Vec<Attachment>,
}

/// Partial ticket update applied after the handler has validated ownership
/// and the status transition. The creator is deliberately absent.
#[derive(Debug, Clone, Default)]
pub struct TicketPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<TicketCategory>,
    pub priority: Option<Priority>,
    pub status: Option<TicketStatus>,
    pub assigned_to: Option<Uuid>,
    pub resolution: Option<Resolution>,
}

impl TicketPatch {
    pub fn apply(&self, ticket: &mut Ticket) {
        if let Some(title) = &self.title {
            ticket.title = title.clone();
        }
        if let Some(description) = &self.description {
            ticket.description = description.clone();
        }
        if let Some(category) = self.category {
            ticket.category = category;
        }
        if let Some(priority) = self.priority {
            ticket.priority = priority;
        }
        if let Some(status) = self.status {
            ticket.status = status;
        }
        if let Some(assigned_to) = self.assigned_to {
            ticket.assigned_to = Some(assigned_to);
        }
        if let Some(resolution) = &self.resolution {
            ticket.resolution = Some(resolution.clone());
        }
        ticket.updated_at = Utc::now();
    }
}

/// Filter predicates for ticket listings. Each listing endpoint differs only
/// in which predicate it applies.
#[derive(Debug, Clone, Copy)]
pub enum TicketFilter {
    All,
    Open,
    AssignedTo(Uuid),
    OwnedBy(Uuid),
    OwnedOrAssigned(Uuid),
}

impl TicketFilter {
    pub fn matches(&self, ticket: &Ticket) -> bool {
        match *self {
            TicketFilter::All => true,
            TicketFilter::Open => ticket.status == TicketStatus::Open,
            TicketFilter::AssignedTo(id) => ticket.assigned_to == Some(id),
            TicketFilter::OwnedBy(id) => ticket.creator == id,
            TicketFilter::OwnedOrAssigned(id) => {
                ticket.creator == id || ticket.assigned_to == Some(id)
            }
        }
    }
}
