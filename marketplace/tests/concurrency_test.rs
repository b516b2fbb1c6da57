//! Concurrency integration tests.
//!
//! Races many callers for one plot (and many admins for one booking) on a
//! multi-threaded runtime. Exactly one must win; the plot must end owned by
//! the winner and never by anyone else.
//!
//! Run with: `cargo test -p marketplace --test concurrency_test`

#![allow(clippy::unwrap_used, clippy::panic)]

mod common;

use common::{admin, app, assert_coupling, list_plot, plot};
use futures::future::join_all;
use marketplace::auth::Principal;
use marketplace::repository;
use marketplace::types::{BookingStatus, PlotStatus, TargetStatus, UserId};
use marketplace::MarketError;
use std::sync::Arc;
use tokio::sync::Barrier;

const RACERS: usize = 32;

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn racing_bookings_have_exactly_one_winner() {
    let (app, store) = app();
    let listed = list_plot(&app, "Last plot").await;
    let barrier = Arc::new(Barrier::new(RACERS));

    let mut handles = Vec::with_capacity(RACERS);
    for _ in 0..RACERS {
        let coordinator = app.coordinator.clone();
        let barrier = Arc::clone(&barrier);
        let user = UserId::new();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            let outcome = coordinator
                .create_booking(&Principal::customer(user), listed.id, None)
                .await;
            (user, outcome)
        }));
    }

    let mut winners = Vec::new();
    for handle in handles {
        let (user, outcome) = handle.await.unwrap();
        match outcome {
            Ok(booking) => winners.push((user, booking)),
            Err(MarketError::PlotUnavailable { .. } | MarketError::Conflict(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(winners.len(), 1, "exactly one booking must succeed");
    let (winner, booking) = &winners[0];
    assert_eq!(booking.user, *winner);

    let held = plot(&store, listed.id).await;
    assert_eq!(held.status, PlotStatus::Booked);
    assert_eq!(held.owner, Some(*winner));
    assert_eq!(repository::list_bookings(&store).await.unwrap().len(), 1);
    assert_coupling(&store).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn races_on_many_plots_stay_consistent() {
    let (app, store) = app();
    let mut plots = Vec::new();
    for n in 0..4 {
        plots.push(list_plot(&app, &format!("Plot {n}")).await);
    }

    let mut handles = Vec::new();
    for round in 0..RACERS {
        let coordinator = app.coordinator.clone();
        let target = plots[round % plots.len()].id;
        handles.push(tokio::spawn(async move {
            coordinator
                .create_booking(&Principal::customer(UserId::new()), target, None)
                .await
        }));
    }

    let successes = join_all(handles)
        .await
        .into_iter()
        .filter(|outcome| outcome.as_ref().unwrap().is_ok())
        .count();

    assert_eq!(successes, plots.len());
    assert_coupling(&store).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn confirm_and_cancel_race_settles_once() {
    let (app, store) = app();
    let listed = list_plot(&app, "Contested").await;
    let booking = app
        .coordinator
        .create_booking(&Principal::customer(UserId::new()), listed.id, None)
        .await
        .unwrap();
    let barrier = Arc::new(Barrier::new(RACERS));

    let mut handles = Vec::new();
    for n in 0..RACERS {
        let coordinator = app.coordinator.clone();
        let barrier = Arc::clone(&barrier);
        let target = if n % 2 == 0 {
            TargetStatus::Confirmed
        } else {
            TargetStatus::Cancelled
        };
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            coordinator.confirm_booking(&admin(), booking.id, target).await
        }));
    }

    let mut settled = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(booking) => settled.push(booking.status),
            Err(MarketError::InvalidTransition { .. } | MarketError::Conflict(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(settled.len(), 1, "a booking leaves pending exactly once");
    let stored = repository::load_booking(&store, booking.id)
        .await
        .unwrap()
        .unwrap()
        .record;
    assert_eq!(stored.status, settled[0]);
    let expected_plot = match stored.status {
        BookingStatus::Confirmed => PlotStatus::Sold,
        BookingStatus::Cancelled => PlotStatus::Available,
        BookingStatus::Pending => panic!("booking still pending"),
    };
    assert_eq!(plot(&store, listed.id).await.status, expected_plot);
    assert_coupling(&store).await;
}
