//! Admin API client for the managed dashboarding server.
//!
//! This crate provides:
//! - `ApiClient`, a thin authenticated JSON request helper over `reqwest`
//! - `AdminApi`, the typed calls the daemon makes (health, users, reloads)
//! - `ApiError`, carrying the server-reported message on non-200 responses

pub mod admin;
pub mod client;
pub mod error;

pub use admin::{AdminApi, CreatedUser, HealthProbe, NewUser};
pub use client::{ApiClient, BasicAuth};
pub use error::ApiError;
