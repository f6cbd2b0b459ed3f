pub mod auth;
pub mod chat;
pub mod http;
pub mod stripe;
