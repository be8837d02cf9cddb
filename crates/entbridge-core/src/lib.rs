//! Core types and trait definitions for the entbridge referral assistant.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it; it depends on nothing proprietary.

pub mod draft;
pub mod error;
pub mod flow;
pub mod profile;
pub mod store;
pub mod submission;
pub mod summary;

pub use error::{Error, Result};
pub use profile::UserId;
