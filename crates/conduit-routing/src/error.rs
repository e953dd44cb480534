//! Routing-specific error types

use thiserror::Error;

/// Errors raised by the suggestion and retraining machinery
#[derive(Debug, Error)]
pub enum RoutingError {
    /// The suggestion history or preference store failed
    #[error("history store unavailable: {0}")]
    Store(String),

    /// A candidate weight table failed validation and was not published
    #[error("invalid weight table: {0}")]
    InvalidWeights(String),
}
