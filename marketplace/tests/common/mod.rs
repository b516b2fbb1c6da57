//! Shared fixtures for marketplace integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::panic)]

use marketplace::MarketplaceApp;
use marketplace::auth::Principal;
use marketplace::mocks::InMemoryIdentityDirectory;
use marketplace::repository;
use marketplace::types::{BookingStatus, Money, NewPlot, Plot, PlotId, PlotStatus, UserId};
use plotmarket_testing::{InMemoryEntityStore, test_clock};
use std::collections::HashMap;
use std::sync::Arc;

/// App over a fresh in-memory store, plus a handle to that store.
pub fn app() -> (MarketplaceApp, InMemoryEntityStore) {
    let store = InMemoryEntityStore::new();
    let app = MarketplaceApp::with_store(
        Arc::new(store.clone()),
        Arc::new(InMemoryIdentityDirectory::new()),
        Arc::new(test_clock()),
    );
    (app, store)
}

pub fn admin() -> Principal {
    Principal::admin(UserId::new())
}

pub async fn list_plot(app: &MarketplaceApp, title: &str) -> Plot {
    app.catalog
        .create_plot(&admin(), NewPlot::new(title, Money::from_cents(1_000_000)))
        .await
        .unwrap()
}

pub async fn plot(store: &InMemoryEntityStore, id: PlotId) -> Plot {
    repository::load_plot(store, id).await.unwrap().unwrap().record
}

/// Check the plot/booking coupling over everything in the store.
///
/// - a plot is `available` iff no booking referencing it is active
/// - at most one active booking per plot
/// - `owner` is set iff the plot is booked or sold, and equals the active booking's user
/// - `booked` pairs with `pending`, `sold` with `confirmed`
pub async fn assert_coupling(store: &InMemoryEntityStore) {
    let plots = repository::list_plots(store).await.unwrap();
    let bookings = repository::list_bookings(store).await.unwrap();

    let mut active = HashMap::new();
    for booking in bookings.iter().filter(|booking| booking.status.is_active()) {
        let previous = active.insert(booking.plot, booking);
        assert!(previous.is_none(), "plot {} has two active bookings", booking.plot);
    }

    for plot in &plots {
        assert!(plot.ownership_is_consistent(), "plot {} owner/status mismatch", plot.id);
        match (plot.status, active.get(&plot.id)) {
            (PlotStatus::Available, None) => {}
            (PlotStatus::Booked, Some(booking)) => {
                assert_eq!(booking.status, BookingStatus::Pending);
                assert_eq!(plot.owner, Some(booking.user));
            }
            (PlotStatus::Sold, Some(booking)) => {
                assert_eq!(booking.status, BookingStatus::Confirmed);
                assert_eq!(plot.owner, Some(booking.user));
            }
            (status, booking) => panic!(
                "plot {} is {status} with active booking {:?}",
                plot.id,
                booking.map(|booking| booking.id)
            ),
        }
    }
}
