//! Error taxonomy surfaced to marketplace callers.

use crate::aggregates::TransitionError;
use crate::auth::AuthError;
use crate::policy::Operation;
use crate::types::{BookingId, BookingStatus, ParseTargetStatusError, PlotId, PlotStatus};
use plotmarket_core::entity_store::EntityStoreError;
use std::fmt;
use thiserror::Error;

/// Which kind of record an id failed to resolve to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityKind {
    /// A plot
    Plot,
    /// A booking
    Booking,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plot => f.write_str("Plot"),
            Self::Booking => f.write_str("Booking"),
        }
    }
}

/// Every outcome a marketplace operation can fail with.
///
/// Variants are distinct and caller-actionable. Only [`Conflict`] and
/// [`StoreUnavailable`] are worth retrying.
///
/// [`Conflict`]: MarketError::Conflict
/// [`StoreUnavailable`]: MarketError::StoreUnavailable
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketError {
    /// The id does not resolve
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of record looked up
        entity: EntityKind,
        /// The id as given
        id: String,
    },

    /// Missing or invalid credential
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// Valid credential, insufficient role
    #[error("Forbidden: {operation} requires the admin role")]
    Forbidden {
        /// The operation refused
        operation: Operation,
    },

    /// The plot is not `available`
    #[error("Plot {plot_id} is not available (status: {status})")]
    PlotUnavailable {
        /// The plot asked for
        plot_id: PlotId,
        /// Its status when the request was refused
        status: PlotStatus,
    },

    /// The booking is not `pending`
    #[error("Booking {booking_id} is {from} and cannot become {to}")]
    InvalidTransition {
        /// The booking
        booking_id: BookingId,
        /// Its current status
        from: BookingStatus,
        /// The status asked for
        to: BookingStatus,
    },

    /// Malformed or unrecognised request parameter
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Record fields failed validation
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A concurrent write won the race
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The entity store failed
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// A bug on our side; retrying cannot help
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MarketError {
    /// Shorthand for a missing plot.
    #[must_use]
    pub fn plot_not_found(id: PlotId) -> Self {
        Self::NotFound {
            entity: EntityKind::Plot,
            id: id.to_string(),
        }
    }

    /// Shorthand for a missing booking.
    #[must_use]
    pub fn booking_not_found(id: BookingId) -> Self {
        Self::NotFound {
            entity: EntityKind::Booking,
            id: id.to_string(),
        }
    }

    /// Whether the caller may retry the same request.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::StoreUnavailable(_))
    }

    /// Stable snake-case name, used as a metrics label.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Unauthenticated(_) => "unauthenticated",
            Self::Forbidden { .. } => "forbidden",
            Self::PlotUnavailable { .. } => "plot_unavailable",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::InvalidRequest(_) => "invalid_request",
            Self::InvalidInput(_) => "invalid_input",
            Self::Conflict(_) => "conflict",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<EntityStoreError> for MarketError {
    fn from(error: EntityStoreError) -> Self {
        match error {
            EntityStoreError::InvalidBatch(_) => Self::Internal(error.to_string()),
            _ if error.is_conflict() => Self::Conflict(error.to_string()),
            _ => Self::StoreUnavailable(error.to_string()),
        }
    }
}

impl From<TransitionError> for MarketError {
    fn from(error: TransitionError) -> Self {
        match error {
            TransitionError::PlotNotFound(id) => Self::plot_not_found(id),
            TransitionError::BookingNotFound(id) => Self::booking_not_found(id),
            TransitionError::PlotUnavailable { plot_id, status } => {
                Self::PlotUnavailable { plot_id, status }
            }
            TransitionError::InvalidTransition {
                booking_id,
                from,
                to,
            } => Self::InvalidTransition {
                booking_id,
                from,
                to,
            },
            TransitionError::Incomplete => {
                Self::Internal(TransitionError::Incomplete.to_string())
            }
        }
    }
}

impl From<AuthError> for MarketError {
    fn from(error: AuthError) -> Self {
        Self::Unauthenticated(error.to_string())
    }
}

impl From<ParseTargetStatusError> for MarketError {
    fn from(error: ParseTargetStatusError) -> Self {
        Self::InvalidRequest(error.to_string())
    }
}
