//! Property-based tests using proptest.
//!
//! Random sequences of booking, confirmation and cancellation requests must
//! keep every plot coupled to its bookings, and each request must succeed
//! exactly when the records it reads allow the transition.

#![allow(clippy::unwrap_used, clippy::panic)]

mod common;

use common::{admin, app, assert_coupling, list_plot, plot};
use marketplace::MarketError;
use marketplace::auth::Principal;
use marketplace::repository;
use marketplace::types::{BookingId, BookingStatus, PlotId, PlotStatus, UserId};
use proptest::prelude::*;

#[derive(Clone, Debug)]
enum Step {
    Book { plot: usize, user: usize },
    Settle { booking: usize, target: &'static str },
    BookAnonymously { plot: usize },
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => (0..3usize, 0..4usize).prop_map(|(plot, user)| Step::Book { plot, user }),
        3 => (0..8usize, prop::sample::select(vec!["confirmed", "cancelled", "confirm"]))
            .prop_map(|(booking, target)| Step::Settle { booking, target }),
        1 => (0..3usize).prop_map(|plot| Step::BookAnonymously { plot }),
    ]
}

async fn run(steps: Vec<Step>) {
    let (app, store) = app();
    let mut plots: Vec<PlotId> = Vec::new();
    for n in 0..3 {
        plots.push(list_plot(&app, &format!("Plot {n}")).await.id);
    }
    let users: Vec<UserId> = (0..4).map(|_| UserId::new()).collect();
    let mut bookings: Vec<BookingId> = Vec::new();

    for step in steps {
        match step {
            Step::Book { plot: p, user } => {
                let was = plot(&store, plots[p]).await;
                let outcome = app
                    .coordinator
                    .create_booking(&Principal::customer(users[user]), plots[p], None)
                    .await;
                match (was.status, outcome) {
                    (PlotStatus::Available, Ok(booking)) => {
                        assert_eq!(plot(&store, plots[p]).await.owner, Some(users[user]));
                        bookings.push(booking.id);
                    }
                    (status, Err(MarketError::PlotUnavailable { status: seen, .. })) => {
                        assert_ne!(status, PlotStatus::Available);
                        assert_eq!(status, seen);
                    }
                    (status, outcome) => panic!("plot was {status}, booking gave {outcome:?}"),
                }
            }
            Step::Settle { booking, target } => {
                let Some(&booking_id) = bookings.get(booking) else {
                    continue;
                };
                let was = repository::load_booking(&store, booking_id)
                    .await
                    .unwrap()
                    .unwrap()
                    .record;
                let outcome = app
                    .coordinator
                    .resolve_booking(&admin(), booking_id, target)
                    .await;
                match (target, was.status, outcome) {
                    (_, _, Err(MarketError::InvalidRequest(_))) => assert_eq!(target, "confirm"),
                    (_, BookingStatus::Pending, Ok(settled)) => {
                        assert_eq!(settled.status.as_str(), target);
                    }
                    (_, status, Err(MarketError::InvalidTransition { from, .. })) => {
                        assert!(status.is_terminal());
                        assert_eq!(from, status);
                    }
                    (target, status, outcome) => {
                        panic!("{target} on {status} booking gave {outcome:?}")
                    }
                }
            }
            Step::BookAnonymously { plot: p } => {
                let outcome = app
                    .coordinator
                    .create_booking(&Principal::Anonymous, plots[p], None)
                    .await;
                assert!(matches!(outcome, Err(MarketError::Unauthenticated(_))));
            }
        }
        assert_coupling(&store).await;
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Plot status and owner always agree with the plot's active booking
    #[test]
    fn operation_sequences_keep_plots_and_bookings_coupled(
        steps in prop::collection::vec(step(), 1..40)
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(run(steps));
    }
}
