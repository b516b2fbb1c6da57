//! Domain types for the plot marketplace.
//!
//! This module contains the identifiers, value objects and the two records
//! whose states move together: [`Plot`] and [`Booking`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a plot
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlotId(Uuid);

impl PlotId {
    /// Creates a new random `PlotId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `PlotId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PlotId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a booking
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BookingId(Uuid);

impl BookingId {
    /// Creates a new random `BookingId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `BookingId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for BookingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a caller, as issued by the identity collaborator
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(Uuid);

impl UserId {
    /// Creates a new random `UserId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `UserId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Money Value Object (cents-based to avoid floating point errors)
// ============================================================================

/// Represents money in cents to avoid floating-point arithmetic errors
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money(u64);

impl Money {
    /// Creates a `Money` value from cents
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Creates a `Money` value from whole currency units with overflow checking
    #[must_use]
    pub const fn checked_from_units(units: u64) -> Option<Self> {
        match units.checked_mul(100) {
            Some(cents) => Some(Self(cents)),
            None => None,
        }
    }

    /// Returns the amount in cents
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

// ============================================================================
// Location
// ============================================================================

/// A point on the map
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude in degrees, `-90..=90`
    pub lat: f64,
    /// Longitude in degrees, `-180..=180`
    pub lng: f64,
}

impl Coordinates {
    /// Whether both components are finite and within range
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Where a plot is. Every part is optional.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Development sector or block
    pub sector: Option<String>,
    /// Plot number within the sector
    pub plot_number: Option<String>,
    /// Map position
    pub coordinates: Option<Coordinates>,
}

// ============================================================================
// Statuses
// ============================================================================

/// Lifecycle of a plot
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlotStatus {
    /// Open for booking
    #[default]
    Available,
    /// Held by a pending booking
    Booked,
    /// Held by a confirmed booking
    Sold,
}

impl PlotStatus {
    /// Wire representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Booked => "booked",
            Self::Sold => "sold",
        }
    }

    /// Whether a plot in this status must have an owner
    #[must_use]
    pub const fn requires_owner(&self) -> bool {
        matches!(self, Self::Booked | Self::Sold)
    }
}

impl fmt::Display for PlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a booking
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    /// Awaiting an administrative decision
    #[default]
    Pending,
    /// Sale confirmed (terminal)
    Confirmed,
    /// Booking withdrawn (terminal)
    Cancelled,
}

impl BookingStatus {
    /// Wire representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether no further transition is possible
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Whether this booking holds its plot
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outcome an administrator asks for when settling a pending booking.
///
/// Only the two literal tokens parse; anything else is an error rather than
/// a silent cancellation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetStatus {
    /// Confirm the sale
    Confirmed,
    /// Cancel the booking and release the plot
    Cancelled,
}

impl TargetStatus {
    /// The booking status this target leads to
    #[must_use]
    pub const fn booking_status(self) -> BookingStatus {
        match self {
            Self::Confirmed => BookingStatus::Confirmed,
            Self::Cancelled => BookingStatus::Cancelled,
        }
    }
}

impl fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.booking_status().as_str())
    }
}

/// Error returned when a target status token is not recognised.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unrecognised target status {0:?}: expected \"confirmed\" or \"cancelled\"")]
pub struct ParseTargetStatusError(String);

impl FromStr for TargetStatus {
    type Err = ParseTargetStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirmed" => Ok(Self::Confirmed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(ParseTargetStatusError(other.to_string())),
        }
    }
}

// ============================================================================
// Records
// ============================================================================

/// Administrative input for a new plot.
///
/// Status and owner are not part of the input: new plots always start
/// `available` with no owner.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewPlot {
    /// Listing title (required, non-blank)
    pub title: String,
    /// Free-text description
    pub description: Option<String>,
    /// Asking price
    pub price: Money,
    /// Where the plot is
    #[serde(default)]
    pub location: Location,
}

impl NewPlot {
    /// Longest accepted title, in characters
    pub const MAX_TITLE_LEN: usize = 200;

    /// Minimal input: a title and a price
    #[must_use]
    pub fn new(title: impl Into<String>, price: Money) -> Self {
        Self {
            title: title.into(),
            description: None,
            price,
            location: Location::default(),
        }
    }

    /// Check the input is acceptable as a listing.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason for the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err("Plot title cannot be empty".to_string());
        }
        if title.chars().count() > Self::MAX_TITLE_LEN {
            return Err(format!(
                "Plot title cannot exceed {} characters",
                Self::MAX_TITLE_LEN
            ));
        }
        if let Some(coordinates) = &self.location.coordinates {
            if !coordinates.is_valid() {
                return Err(format!(
                    "Coordinates out of range: lat {}, lng {}",
                    coordinates.lat, coordinates.lng
                ));
            }
        }
        Ok(())
    }
}

/// A sellable unit of land
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Plot {
    /// Plot identifier
    pub id: PlotId,
    /// Listing title
    pub title: String,
    /// Free-text description
    pub description: Option<String>,
    /// Asking price
    pub price: Money,
    /// Where the plot is
    pub location: Location,
    /// Lifecycle status
    pub status: PlotStatus,
    /// Holder of the current booking, if any
    pub owner: Option<UserId>,
    /// When the plot was listed
    pub created_at: DateTime<Utc>,
    /// Last modification
    pub updated_at: DateTime<Utc>,
}

impl Plot {
    /// List a new plot: `available`, no owner.
    #[must_use]
    pub fn list(id: PlotId, input: NewPlot, now: DateTime<Utc>) -> Self {
        Self {
            id,
            title: input.title.trim().to_string(),
            description: input.description,
            price: input.price,
            location: input.location,
            status: PlotStatus::Available,
            owner: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the plot can be booked right now
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.status == PlotStatus::Available
    }

    /// `owner` is set exactly when the status requires one
    #[must_use]
    pub const fn ownership_is_consistent(&self) -> bool {
        self.status.requires_owner() == self.owner.is_some()
    }
}

/// A reservation request against a plot
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    /// Booking identifier
    pub id: BookingId,
    /// Who asked for the plot
    pub user: UserId,
    /// The plot asked for
    pub plot: PlotId,
    /// Optional note from the requester
    pub note: Option<String>,
    /// Lifecycle status
    pub status: BookingStatus,
    /// When the booking was requested
    pub created_at: DateTime<Utc>,
    /// Last modification
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// A fresh `pending` booking
    #[must_use]
    pub const fn pending(
        id: BookingId,
        user: UserId,
        plot: PlotId,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user,
            plot,
            note,
            status: BookingStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn target_status_parses_only_literal_tokens() {
        assert_eq!("confirmed".parse::<TargetStatus>(), Ok(TargetStatus::Confirmed));
        assert_eq!("cancelled".parse::<TargetStatus>(), Ok(TargetStatus::Cancelled));

        for token in ["confirm", "Confirmed", "canceled", "", "sold"] {
            assert!(token.parse::<TargetStatus>().is_err(), "{token:?} should not parse");
        }
    }

    #[test]
    fn statuses_serialize_lowercase() {
        assert_eq!(serde_json::to_value(PlotStatus::Booked).unwrap(), "booked");
        assert_eq!(serde_json::to_value(BookingStatus::Cancelled).unwrap(), "cancelled");
        let parsed: BookingStatus = serde_json::from_str("\"confirmed\"").unwrap();
        assert_eq!(parsed, BookingStatus::Confirmed);
    }

    #[test]
    fn booking_status_classification() {
        assert!(!BookingStatus::Pending.is_terminal());
        assert!(BookingStatus::Confirmed.is_terminal());
        assert!(BookingStatus::Cancelled.is_terminal());
        assert!(BookingStatus::Confirmed.is_active());
        assert!(!BookingStatus::Cancelled.is_active());
    }

    #[test]
    fn money_display() {
        assert_eq!(Money::from_cents(1_250_099).to_string(), "12500.99");
        assert_eq!(Money::checked_from_units(3).unwrap(), Money::from_cents(300));
        assert!(Money::checked_from_units(u64::MAX).is_none());
    }

    #[test]
    fn new_plot_validation() {
        assert!(NewPlot::new("Corner plot", Money::from_cents(100)).validate().is_ok());
        assert!(NewPlot::new("   ", Money::from_cents(100)).validate().is_err());
        assert!(NewPlot::new("x".repeat(201), Money::from_cents(100)).validate().is_err());

        let mut input = NewPlot::new("Hillside", Money::from_cents(100));
        input.location.coordinates = Some(Coordinates { lat: 91.0, lng: 0.0 });
        assert!(input.validate().is_err());
        input.location.coordinates = Some(Coordinates { lat: 12.5, lng: f64::NAN });
        assert!(input.validate().is_err());
        input.location.coordinates = Some(Coordinates { lat: 12.5, lng: -77.0 });
        assert!(input.validate().is_ok());
    }

    #[test]
    fn listed_plot_starts_available_without_owner() {
        let now = Utc::now();
        let plot = Plot::list(PlotId::new(), NewPlot::new("  Lakeside  ", Money::default()), now);
        assert_eq!(plot.title, "Lakeside");
        assert!(plot.is_available());
        assert!(plot.owner.is_none());
        assert!(plot.ownership_is_consistent());
        assert_eq!(plot.created_at, plot.updated_at);
    }

    #[test]
    fn booking_serializes_plot_reference_as_plot() {
        let plot = PlotId::new();
        let booking = Booking::pending(BookingId::new(), UserId::new(), plot, None, Utc::now());
        let value = serde_json::to_value(&booking).unwrap();
        assert_eq!(value["plot"], serde_json::to_value(plot).unwrap());
        assert_eq!(value["status"], "pending");
    }
}
