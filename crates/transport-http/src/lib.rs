// HTTP transport for the Needle narration API

pub mod auth;
pub mod books;
pub mod client;
pub mod narration;

pub use client::{create_http_agent, ApiClient};
