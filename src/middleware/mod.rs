pub mod auth;
pub mod response;

pub use auth::{authenticate, CurrentUser, RolePolicy};
pub use response::{ApiResponse, ApiResult};
