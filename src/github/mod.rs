//! GitHub Remote Run API: the consumed interface and its REST implementation.
//!
//! # Module Structure
//!
//! - [`error`]: transient/permanent API error categorization
//! - [`client`]: the [`RunApi`] trait and the reqwest-backed [`GitHubClient`]

mod client;
mod error;

pub use client::{GitHubClient, RunApi};
pub use error::{ApiError, ApiErrorKind};
