//! # flatrec Testkit
//!
//! Test utilities for flatrec.
//!
//! This crate provides:
//! - Store fixtures over in-memory and temporary-directory volumes
//! - Property-based test generators using proptest
//! - A reference model of a flat file to check engine edits against
//!
//! ## Usage
//!
//! ```rust
//! use flatrec_core::FileKind;
//! use flatrec_testkit::prelude::*;
//!
//! let mut fixture = TestStore::memory();
//! fixture.seed(FileKind::StoredStrings, b"h\r\na\r\n");
//! assert_eq!(fixture.store.count_entries(FileKind::StoredStrings).unwrap(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod model;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::model::*;
}

pub use fixtures::*;
pub use generators::*;
pub use model::*;
