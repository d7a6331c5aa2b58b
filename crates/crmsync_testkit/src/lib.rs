//! # crmsync Testkit
//!
//! Test utilities for crmsync.
//!
//! This crate provides:
//! - [`FakeCrm`], an in-memory remote with real pagination, filters and
//!   totals, plus rate-limit and failure injection
//! - Store fixtures backed by in-memory or temporary-file SQLite
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use crmsync_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_store() {
//!     let crm = FakeCrm::new(EntityKind::Spa { id: 1054 });
//!     crm.add_field("title", field("string", "Title"));
//!     with_temp_store(|store| {
//!         // ... build a context and sync
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fake_crm;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fake_crm::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crmsync_remote::EntityKind;
}

pub use fake_crm::*;
pub use fixtures::*;
pub use generators::*;
