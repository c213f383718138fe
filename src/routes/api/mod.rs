//! Per-project public REST surface under `/api/{projectId}/...`.
//!
//! Authenticated with the project's bearer API key, except category GETs
//! which are public. Errors are plain HTTP statuses, not the console's
//! action envelope.

pub mod categories;
pub mod stores;
pub mod users;
