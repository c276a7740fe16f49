//! HTTP client for the remote submission authority.

pub mod client;
pub mod error;
pub mod types;

pub use client::{configured_base_url, AuthorityClient, API_URL_ENV};
pub use error::{AuthorityError, Result};
pub use types::ApiErrorResponse;
