//! Data models for the image service.
//!
//! `StoredFile` maps onto the `files` table via `sqlx::FromRow` and doubles as
//! the JSON descriptor returned to clients.

pub mod stored_file;
pub mod upload;
