//! Mapping between marketplace records and stored documents.
//!
//! Plots live in the `plots` collection and bookings in `bookings`, keyed by
//! their UUID. Loads return the record with its [`Version`] so that the
//! follow-up write can be guarded on it.

use crate::error::MarketError;
use crate::types::{Booking, BookingId, Plot, PlotId};
use plotmarket_core::document::{Collection, Document, DocumentKey, Version};
use plotmarket_core::entity_store::{EntityStore, EntityStoreError, Write};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Collection holding plots
pub const PLOTS: &str = "plots";

/// Collection holding bookings
pub const BOOKINGS: &str = "bookings";

/// A record together with the stored version it was read at.
#[derive(Clone, Debug, PartialEq)]
pub struct Versioned<T> {
    /// The decoded record
    pub record: T,
    /// Version to guard the next write on
    pub version: Version,
}

fn plots() -> Collection {
    Collection::new(PLOTS)
}

fn bookings() -> Collection {
    Collection::new(BOOKINGS)
}

/// Document key of a plot
#[must_use]
pub fn plot_key(id: PlotId) -> DocumentKey {
    DocumentKey::new(plots(), id.to_string())
}

/// Document key of a booking
#[must_use]
pub fn booking_key(id: BookingId) -> DocumentKey {
    DocumentKey::new(bookings(), id.to_string())
}

/// Load a plot and its version.
///
/// # Errors
///
/// [`MarketError::StoreUnavailable`] if the store fails or the document does
/// not decode.
pub async fn load_plot(
    store: &dyn EntityStore,
    id: PlotId,
) -> Result<Option<Versioned<Plot>>, MarketError> {
    store.get(plot_key(id)).await?.map(decode).transpose()
}

/// Load a booking and its version.
///
/// # Errors
///
/// [`MarketError::StoreUnavailable`] if the store fails or the document does
/// not decode.
pub async fn load_booking(
    store: &dyn EntityStore,
    id: BookingId,
) -> Result<Option<Versioned<Booking>>, MarketError> {
    store.get(booking_key(id)).await?.map(decode).transpose()
}

/// Every stored plot.
///
/// # Errors
///
/// [`MarketError::StoreUnavailable`] on store or decoding failure.
pub async fn list_plots(store: &dyn EntityStore) -> Result<Vec<Plot>, MarketError> {
    list(store, plots()).await
}

/// Every stored booking.
///
/// # Errors
///
/// [`MarketError::StoreUnavailable`] on store or decoding failure.
pub async fn list_bookings(store: &dyn EntityStore) -> Result<Vec<Booking>, MarketError> {
    list(store, bookings()).await
}

async fn list<T: DeserializeOwned>(
    store: &dyn EntityStore,
    collection: Collection,
) -> Result<Vec<T>, MarketError> {
    store
        .list(collection)
        .await?
        .into_iter()
        .map(|document| decode(document).map(|versioned| versioned.record))
        .collect()
}

/// A write creating `plot`.
///
/// # Errors
///
/// [`MarketError::StoreUnavailable`] if the record does not encode.
pub fn insert_plot(plot: &Plot) -> Result<Write, MarketError> {
    Ok(Write::insert(plot_key(plot.id), encode(plot)?))
}

/// A write replacing `plot`, guarded on `expected`.
///
/// # Errors
///
/// [`MarketError::StoreUnavailable`] if the record does not encode.
pub fn update_plot(plot: &Plot, expected: Version) -> Result<Write, MarketError> {
    Ok(Write::update(plot_key(plot.id), expected, encode(plot)?))
}

/// A write creating `booking`.
///
/// # Errors
///
/// [`MarketError::StoreUnavailable`] if the record does not encode.
pub fn insert_booking(booking: &Booking) -> Result<Write, MarketError> {
    Ok(Write::insert(booking_key(booking.id), encode(booking)?))
}

/// A write replacing `booking`, guarded on `expected`.
///
/// # Errors
///
/// [`MarketError::StoreUnavailable`] if the record does not encode.
pub fn update_booking(booking: &Booking, expected: Version) -> Result<Write, MarketError> {
    Ok(Write::update(booking_key(booking.id), expected, encode(booking)?))
}

fn encode<T: Serialize>(record: &T) -> Result<serde_json::Value, MarketError> {
    serde_json::to_value(record)
        .map_err(|error| EntityStoreError::SerializationError(error.to_string()).into())
}

fn decode<T: DeserializeOwned>(document: Document) -> Result<Versioned<T>, MarketError> {
    let record = serde_json::from_value(document.body).map_err(|error| {
        tracing::error!(key = %document.key, error = %error, "Stored document does not decode");
        MarketError::from(EntityStoreError::SerializationError(format!(
            "{}: {error}",
            document.key
        )))
    })?;
    Ok(Versioned {
        record,
        version: document.version,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{BookingStatus, Money, NewPlot, UserId};
    use plotmarket_core::entity_store::WriteBatch;
    use plotmarket_testing::InMemoryEntityStore;
    use serde_json::json;

    fn plot() -> Plot {
        Plot::list(PlotId::new(), NewPlot::new("Riverside", Money::from_cents(90_000)), chrono::Utc::now())
    }

    #[tokio::test]
    async fn plots_and_bookings_round_trip_with_versions() {
        let store = InMemoryEntityStore::new();
        let plot = plot();
        let booking = Booking::pending(BookingId::new(), UserId::new(), plot.id, None, plot.created_at);

        store
            .commit(
                WriteBatch::new()
                    .with(insert_plot(&plot).unwrap())
                    .with(insert_booking(&booking).unwrap()),
            )
            .await
            .unwrap();

        let loaded = load_plot(&store, plot.id).await.unwrap().unwrap();
        assert_eq!(loaded.record, plot);
        assert_eq!(loaded.version, Version::FIRST);

        let mut confirmed = booking.clone();
        confirmed.status = BookingStatus::Confirmed;
        store
            .commit(WriteBatch::new().with(update_booking(&confirmed, Version::FIRST).unwrap()))
            .await
            .unwrap();
        let loaded = load_booking(&store, booking.id).await.unwrap().unwrap();
        assert_eq!(loaded.record.status, BookingStatus::Confirmed);
        assert_eq!(loaded.version, Version::new(2));

        assert_eq!(list_plots(&store).await.unwrap(), vec![plot]);
        assert_eq!(list_bookings(&store).await.unwrap().len(), 1);
        assert!(load_plot(&store, PlotId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_document_is_store_failure() {
        let store = InMemoryEntityStore::new();
        let id = PlotId::new();
        store
            .commit(WriteBatch::new().with(Write::insert(plot_key(id), json!({"title": 7}))))
            .await
            .unwrap();

        let error = load_plot(&store, id).await.unwrap_err();
        assert!(matches!(error, MarketError::StoreUnavailable(_)));
    }
}
