//! Booking state machine.
//!
//! The reducer works on a [`ReservationState`]: one plot and, once a request
//! has been made, the booking that holds it. The two records move together:
//!
//! | Transition | Booking | Plot |
//! |---|---|---|
//! | request | (none) → `pending` | `available` → `booked`, owner = caller |
//! | confirm | `pending` → `confirmed` | `booked` → `sold`, owner kept |
//! | cancel | `pending` → `cancelled` | → `available`, owner cleared |
//!
//! `confirmed` and `cancelled` are terminal. The reducer never performs I/O;
//! persisting the resulting records is the coordinator's job.

use crate::types::{
    Booking, BookingId, BookingStatus, Plot, PlotId, PlotStatus, TargetStatus, UserId,
};
use chrono::{DateTime, Utc};
use plotmarket_core::{SmallVec, effect::Effect, environment::Clock, reducer::Reducer};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// State
// ============================================================================

/// A plot together with the booking being transitioned.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReservationState {
    /// The plot
    pub plot: Option<Plot>,
    /// The booking, once one exists
    pub booking: Option<Booking>,
    /// Why the last command was rejected, if it was
    pub last_error: Option<TransitionError>,
}

impl ReservationState {
    /// State for a booking request against `plot`.
    #[must_use]
    pub const fn for_plot(plot: Plot) -> Self {
        Self {
            plot: Some(plot),
            booking: None,
            last_error: None,
        }
    }

    /// State for settling `booking`, which references `plot`.
    #[must_use]
    pub const fn for_booking(plot: Plot, booking: Booking) -> Self {
        Self {
            plot: Some(plot),
            booking: Some(booking),
            last_error: None,
        }
    }

    /// The records after the last command, or the reason it was rejected.
    ///
    /// # Errors
    ///
    /// Returns the recorded [`TransitionError`], or
    /// [`TransitionError::Incomplete`] if either record is missing.
    pub fn into_outcome(self) -> Result<(Plot, Booking), TransitionError> {
        if let Some(error) = self.last_error {
            return Err(error);
        }
        match (self.plot, self.booking) {
            (Some(plot), Some(booking)) => Ok((plot, booking)),
            (None, Some(booking)) => Err(TransitionError::PlotNotFound(booking.plot)),
            _ => Err(TransitionError::Incomplete),
        }
    }
}

/// Why a transition was refused.
#[derive(Error, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionError {
    /// The plot is not part of the state
    #[error("plot {0} not found")]
    PlotNotFound(PlotId),

    /// The booking is not part of the state
    #[error("booking {0} not found")]
    BookingNotFound(BookingId),

    /// The plot cannot be booked in its current status
    #[error("plot {plot_id} is {status}")]
    PlotUnavailable {
        /// The plot asked for
        plot_id: PlotId,
        /// Its current status
        status: PlotStatus,
    },

    /// The booking is not `pending`
    #[error("booking {booking_id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// The booking
        booking_id: BookingId,
        /// Its current status
        from: BookingStatus,
        /// The status asked for
        to: BookingStatus,
    },

    /// The state lacks the plot or booking a transition produces
    #[error("reservation state is incomplete")]
    Incomplete,
}

// ============================================================================
// Actions (Commands + Events)
// ============================================================================

/// Commands sent to the reservation reducer and the events they produce.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ReservationAction {
    // Commands
    /// Ask to book the plot in state
    RequestBooking {
        /// Id for the new booking
        booking_id: BookingId,
        /// Plot to book
        plot_id: PlotId,
        /// Requesting caller
        user: UserId,
        /// Optional note
        note: Option<String>,
    },

    /// Confirm a pending booking, selling the plot
    ConfirmBooking {
        /// Booking to confirm
        booking_id: BookingId,
    },

    /// Cancel a pending booking, releasing the plot
    CancelBooking {
        /// Booking to cancel
        booking_id: BookingId,
    },

    // Events
    /// A booking was requested and the plot is now held
    BookingRequested {
        /// New booking
        booking_id: BookingId,
        /// Plot held
        plot_id: PlotId,
        /// New owner
        user: UserId,
        /// Optional note
        note: Option<String>,
        /// When the request was accepted
        requested_at: DateTime<Utc>,
    },

    /// A booking was confirmed and the plot sold
    BookingConfirmed {
        /// Confirmed booking
        booking_id: BookingId,
        /// When
        confirmed_at: DateTime<Utc>,
    },

    /// A booking was cancelled and the plot released
    BookingCancelled {
        /// Cancelled booking
        booking_id: BookingId,
        /// When
        cancelled_at: DateTime<Utc>,
    },

    /// A command was refused; records are unchanged
    TransitionRejected {
        /// Reason
        error: TransitionError,
    },
}

impl ReservationAction {
    /// The command moving `booking_id` to `target`.
    #[must_use]
    pub const fn settle(booking_id: BookingId, target: TargetStatus) -> Self {
        match target {
            TargetStatus::Confirmed => Self::ConfirmBooking { booking_id },
            TargetStatus::Cancelled => Self::CancelBooking { booking_id },
        }
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Environment dependencies for the reservation reducer
#[derive(Clone)]
pub struct ReservationEnvironment {
    /// Clock for timestamps
    pub clock: Arc<dyn Clock>,
}

impl ReservationEnvironment {
    /// Creates a new `ReservationEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for the booking state machine
#[derive(Clone, Copy, Debug, Default)]
pub struct ReservationReducer;

impl ReservationReducer {
    /// Creates a new `ReservationReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn validate_request(state: &ReservationState, plot_id: PlotId) -> Result<(), TransitionError> {
        let Some(plot) = state.plot.as_ref().filter(|plot| plot.id == plot_id) else {
            return Err(TransitionError::PlotNotFound(plot_id));
        };
        if !plot.is_available() {
            return Err(TransitionError::PlotUnavailable {
                plot_id,
                status: plot.status,
            });
        }
        Ok(())
    }

    /// A booking may only leave `pending`, and only with its plot loaded.
    fn validate_settle(
        state: &ReservationState,
        booking_id: BookingId,
        to: BookingStatus,
    ) -> Result<(), TransitionError> {
        let Some(booking) = state.booking.as_ref().filter(|booking| booking.id == booking_id)
        else {
            return Err(TransitionError::BookingNotFound(booking_id));
        };
        if state.plot.as_ref().is_none_or(|plot| plot.id != booking.plot) {
            return Err(TransitionError::PlotNotFound(booking.plot));
        }
        if booking.status != BookingStatus::Pending {
            return Err(TransitionError::InvalidTransition {
                booking_id,
                from: booking.status,
                to,
            });
        }
        Ok(())
    }

    fn apply_event(state: &mut ReservationState, action: &ReservationAction) {
        match action {
            ReservationAction::BookingRequested {
                booking_id,
                plot_id,
                user,
                note,
                requested_at,
            } => {
                if let Some(plot) = state.plot.as_mut() {
                    plot.status = PlotStatus::Booked;
                    plot.owner = Some(*user);
                    plot.updated_at = *requested_at;
                }
                state.booking = Some(Booking::pending(
                    *booking_id,
                    *user,
                    *plot_id,
                    note.clone(),
                    *requested_at,
                ));
                state.last_error = None;
            }

            ReservationAction::BookingConfirmed { confirmed_at, .. } => {
                if let Some(booking) = state.booking.as_mut() {
                    booking.status = BookingStatus::Confirmed;
                    booking.updated_at = *confirmed_at;
                }
                if let Some(plot) = state.plot.as_mut() {
                    plot.status = PlotStatus::Sold;
                    plot.updated_at = *confirmed_at;
                }
                state.last_error = None;
            }

            ReservationAction::BookingCancelled { cancelled_at, .. } => {
                if let Some(booking) = state.booking.as_mut() {
                    booking.status = BookingStatus::Cancelled;
                    booking.updated_at = *cancelled_at;
                }
                if let Some(plot) = state.plot.as_mut() {
                    plot.status = PlotStatus::Available;
                    plot.owner = None;
                    plot.updated_at = *cancelled_at;
                }
                state.last_error = None;
            }

            ReservationAction::TransitionRejected { error } => {
                state.last_error = Some(error.clone());
            }

            // Commands are not events
            ReservationAction::RequestBooking { .. }
            | ReservationAction::ConfirmBooking { .. }
            | ReservationAction::CancelBooking { .. } => {}
        }
    }

    fn reject(state: &mut ReservationState, error: TransitionError) {
        Self::apply_event(state, &ReservationAction::TransitionRejected { error });
    }
}

impl Reducer for ReservationReducer {
    type State = ReservationState;
    type Action = ReservationAction;
    type Environment = ReservationEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            // ========== Commands ==========
            ReservationAction::RequestBooking {
                booking_id,
                plot_id,
                user,
                note,
            } => {
                if let Err(error) = Self::validate_request(state, plot_id) {
                    Self::reject(state, error);
                    return SmallVec::new();
                }

                let event = ReservationAction::BookingRequested {
                    booking_id,
                    plot_id,
                    user,
                    note,
                    requested_at: env.clock.now(),
                };
                Self::apply_event(state, &event);
            }

            ReservationAction::ConfirmBooking { booking_id } => {
                if let Err(error) =
                    Self::validate_settle(state, booking_id, BookingStatus::Confirmed)
                {
                    Self::reject(state, error);
                    return SmallVec::new();
                }

                let event = ReservationAction::BookingConfirmed {
                    booking_id,
                    confirmed_at: env.clock.now(),
                };
                Self::apply_event(state, &event);
            }

            ReservationAction::CancelBooking { booking_id } => {
                if let Err(error) =
                    Self::validate_settle(state, booking_id, BookingStatus::Cancelled)
                {
                    Self::reject(state, error);
                    return SmallVec::new();
                }

                let event = ReservationAction::BookingCancelled {
                    booking_id,
                    cancelled_at: env.clock.now(),
                };
                Self::apply_event(state, &event);
            }

            // ========== Events ==========
            event => Self::apply_event(state, &event),
        }

        // Follow-on work (payment capture, notifications) would be returned here.
        SmallVec::new()
    }
}
