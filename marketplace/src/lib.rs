//! Plot Marketplace - land plots booked through a concurrency-safe reservation workflow
//!
//! Plots move between `available`, `booked` and `sold`; bookings between
//! `pending`, `confirmed` and `cancelled`. The two records always move
//! together:
//!
//! ```text
//!            request                 confirm
//!  available ───────▶ booked/pending ───────▶ sold/confirmed
//!      ▲                    │
//!      └────────────────────┘
//!              cancel (→ cancelled)
//! ```
//!
//! # Architecture
//!
//! - [`aggregates::reservation`]: pure reducer encoding the state machine
//! - [`coordinator`]: loads records, runs the reducer and commits the result
//!   as one version-guarded write batch
//! - [`policy`]: the single authorisation predicate
//! - [`catalog`]: plot listing, lookup and creation with the owner join
//! - [`auth`]: bearer credential and identity directory seams
//!
//! # Concurrency
//!
//! The entity store is the only arbiter. Every transition writes the plot
//! and the booking in one atomic batch guarded on the versions it read, so of
//! N callers racing for one plot exactly one commits; the others see
//! [`MarketError::PlotUnavailable`] or [`MarketError::Conflict`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod aggregates;
pub mod app;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod mocks;
pub mod policy;
pub mod repository;
pub mod types;

pub use app::{AppError, MarketplaceApp};
pub use auth::{Caller, Principal, Role, authenticate};
pub use catalog::{PlotCatalog, PlotView};
pub use config::Config;
pub use coordinator::ReservationCoordinator;
pub use error::MarketError;
pub use policy::{Decision, Operation, authorize};
pub use types::{Booking, BookingId, BookingStatus, Plot, PlotId, PlotStatus, TargetStatus, UserId};
