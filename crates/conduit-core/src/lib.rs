//! Shared primitives used across the Conduit crates

#![allow(clippy::must_use_candidate)]

mod error;
mod provider;

pub use error::HttpError;
pub use provider::ProviderKind;
