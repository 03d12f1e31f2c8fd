//! # Gatehouse Core
//!
//! Core types shared by every Gatehouse crate:
//!
//! - [`Reply`] - the uniform value returned by handlers and interceptors
//! - [`AppError`] / [`FieldErrors`] - classified failures with provenance
//! - [`RequestContext`] - the immutable, append-only per-request context
//! - [`ResponseWriter`] - the shared transport writer

#![doc(html_root_url = "https://docs.rs/gatehouse-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod context;
mod error;
pub mod reply;
mod writer;

pub use context::{RemoteAddr, RequestContext, RequestId, TraceId, UserId};
pub use error::{AppError, AppResult, ErrorBody, ErrorKind, FieldError, FieldErrors, Provenance};
pub use reply::{EncodeError, Encoded, Failure, HtmlReply, JsonReply, Reply};
pub use writer::ResponseWriter;
