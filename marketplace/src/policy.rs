//! Access policy gate.
//!
//! One predicate, [`authorize`], decides every operation. The coordinator and
//! the catalog call [`enforce`] before touching the store.

use crate::auth::Principal;
use crate::error::MarketError;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// Operations subject to authorisation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// List all plots
    ListPlots,
    /// Fetch one plot
    GetPlot,
    /// List a new plot
    CreatePlot,
    /// Book an available plot
    RequestBooking,
    /// Confirm a pending booking
    ConfirmBooking,
    /// Cancel a pending booking
    CancelBooking,
}

/// Minimum standing an operation demands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Requirement {
    /// Anyone, including anonymous requesters
    Public,
    /// Any authenticated caller
    Authenticated,
    /// Administrative role
    Admin,
}

impl Operation {
    /// What a principal needs to perform this operation.
    #[must_use]
    pub const fn requirement(self) -> Requirement {
        match self {
            Self::ListPlots | Self::GetPlot => Requirement::Public,
            Self::RequestBooking => Requirement::Authenticated,
            Self::CreatePlot | Self::ConfirmBooking | Self::CancelBooking => Requirement::Admin,
        }
    }

    /// Snake-case name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ListPlots => "list_plots",
            Self::GetPlot => "get_plot",
            Self::CreatePlot => "create_plot",
            Self::RequestBooking => "request_booking",
            Self::ConfirmBooking => "confirm_booking",
            Self::CancelBooking => "cancel_booking",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of [`authorize`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Go ahead
    Allow,
    /// A credential is required and none was given
    Unauthenticated,
    /// The caller is known but lacks the role
    Forbidden,
}

impl Decision {
    /// Whether the operation may proceed
    #[must_use]
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Decide whether `principal` may perform `operation`.
#[must_use]
pub fn authorize(principal: &Principal, operation: Operation) -> Decision {
    match (operation.requirement(), principal.caller()) {
        (Requirement::Public, _) => Decision::Allow,
        (_, None) => Decision::Unauthenticated,
        (Requirement::Authenticated, Some(_)) => Decision::Allow,
        (Requirement::Admin, Some(caller)) if caller.is_admin() => Decision::Allow,
        (Requirement::Admin, Some(_)) => Decision::Forbidden,
    }
}

/// [`authorize`], turning denials into errors and logging them.
///
/// # Errors
///
/// [`MarketError::Unauthenticated`] for anonymous principals on a protected
/// operation, [`MarketError::Forbidden`] for callers without the role.
pub fn enforce(principal: &Principal, operation: Operation) -> Result<(), MarketError> {
    match authorize(principal, operation) {
        Decision::Allow => {
            debug!(operation = %operation, "Access granted");
            Ok(())
        }
        Decision::Unauthenticated => {
            warn!(operation = %operation, "Access denied: no credential");
            Err(MarketError::Unauthenticated(format!(
                "{operation} requires a bearer credential"
            )))
        }
        Decision::Forbidden => {
            let caller = principal.caller().map(|caller| caller.id);
            warn!(operation = %operation, caller = ?caller, "Access denied: admin role required");
            Err(MarketError::Forbidden { operation })
        }
    }
}
