//! # crmsync Remote
//!
//! The remote side of a sync run: a paginated, rate-limited CRM REST API.
//!
//! This crate provides:
//! - The [`RemoteSource`] trait (`call` and `batch`)
//! - [`EntityKind`]: which methods, id keys and payload shapes each kind uses
//! - [`ListPage`]: a decoded list response, with rate-limit telemetry
//! - [`WebhookSource`]: JSON-over-HTTP against an inbound webhook URL, with
//!   the HTTP client itself abstracted behind [`HttpClient`]
//!
//! The remote is read-only from the point of view of crmsync; nothing here
//! writes records back.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod entity;
mod error;
mod http;
mod page;
mod source;

pub use entity::{record_id, EntityKind};
pub use error::{RemoteError, RemoteResult};
pub use http::{HttpClient, WebhookSource};
pub use page::ListPage;
pub use source::RemoteSource;

/// Field metadata keyed by remote field identifier, as returned by a field listing.
pub type FieldListing = serde_json::Map<String, serde_json::Value>;
