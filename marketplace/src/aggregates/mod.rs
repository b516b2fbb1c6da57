//! Aggregates for the plot marketplace.
//!
//! - [`reservation`]: the booking state machine coupling a plot to its booking

pub mod reservation;

pub use reservation::{
    ReservationAction, ReservationEnvironment, ReservationReducer, ReservationState,
    TransitionError,
};
