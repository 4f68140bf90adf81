//! Jobfeed Common Library
//!
//! Shared types, utilities, and error handling for the jobfeed workspace.
//!
//! # Overview
//!
//! - **Error Handling**: Common error type and result alias
//! - **Logging**: `tracing` subscriber setup driven by `LOG_*` environment variables
//! - **Types**: Canonical posting, source, and salary types shared by ingestion and queries
//! - **Text**: Markup stripping for free-text fields coming from job boards
//!
//! # Example
//!
//! ```no_run
//! use jobfeed_common::text::strip_markup;
//!
//! let clean = strip_markup("<p>Стажировка <b>Python</b></p>");
//! assert_eq!(clean, "Стажировка Python");
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod logging;
pub mod text;
pub mod types;

// Re-export commonly used types
pub use error::{JobfeedError, Result};
pub use types::{NewPosting, Posting, SalaryRange, Source};
