pub mod article;
pub mod ticket;
pub mod user;

pub use article::{Article, ArticleComment, ArticlePatch, ArticleType, NewArticle};
pub use ticket::{
    Attachment, Escalation, NewTicket, Priority, Resolution, ResolutionFeedback, Ticket,
    TicketCategory, TicketComment, TicketFilter, TicketPatch, TicketStatus,
};
pub use user::{Availability, NewUser, Role, User, UserPatch, UserResponse};
