#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! SerpDeck Shared Types and Utilities
//!
//! This crate contains the account model, plan names, errors and database
//! helpers shared by the API server, the billing crate and the worker.

pub mod db;
pub mod error;
pub mod types;

pub use db::*;
pub use error::*;
pub use types::*;
