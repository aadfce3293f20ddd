//! HTTP transport for calcsheet.
//!
//! [`HttpBackend`] speaks the lock protocol (`/sheets/{id}/lock`) and the sheet and
//! version protocol (`/sheets/{id}`, `/sheets/{id}/versions`). All response
//! interpretation lives in [`decode`] as pure functions over `(status, body)`.

mod backend;
pub mod decode;
mod error;

pub use backend::{HttpBackend, MAX_BODY_BYTES};
pub use error::ClientError;
