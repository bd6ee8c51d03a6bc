pub mod articles;
pub mod auth;
pub mod tickets;
pub mod users;
pub(crate) mod util;
