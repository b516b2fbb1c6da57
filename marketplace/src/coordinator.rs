//! Reservation coordinator.
//!
//! Each operation follows the same steps:
//!
//! 1. authorise the principal through the policy gate;
//! 2. load the plot (and booking) together with their stored versions;
//! 3. run the transition through [`ReservationReducer`];
//! 4. commit every changed record as one [`WriteBatch`] guarded on the loaded
//!    versions.
//!
//! A batch either applies entirely or not at all, so two callers racing for
//! one plot cannot both succeed: the loser's guard fails and it gets
//! `PlotUnavailable` (the plot is gone) or `Conflict` (retry). Nothing is
//! retried here.

use crate::aggregates::{
    ReservationAction, ReservationEnvironment, ReservationReducer, ReservationState,
};
use crate::auth::Principal;
use crate::error::MarketError;
use crate::policy::{self, Operation};
use crate::repository;
use crate::types::{Booking, BookingId, BookingStatus, PlotId, TargetStatus};
use plotmarket_core::entity_store::{EntityStore, EntityStoreError, WriteBatch};
use plotmarket_core::environment::Clock;
use plotmarket_core::reducer::Reducer;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Drives booking transitions against the entity store.
#[derive(Clone)]
pub struct ReservationCoordinator {
    store: Arc<dyn EntityStore>,
    reducer: ReservationReducer,
    env: ReservationEnvironment,
}

impl ReservationCoordinator {
    /// Create a coordinator over `store`, stamping records with `clock`.
    #[must_use]
    pub fn new(store: Arc<dyn EntityStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            reducer: ReservationReducer::new(),
            env: ReservationEnvironment::new(clock),
        }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    /// Book an available plot for the calling user.
    ///
    /// On success the booking is `pending`, and the plot is `booked` and owned
    /// by the caller.
    ///
    /// # Errors
    ///
    /// - [`MarketError::Unauthenticated`]: anonymous principal
    /// - [`MarketError::NotFound`]: the plot does not exist
    /// - [`MarketError::PlotUnavailable`]: the plot is booked or sold
    /// - [`MarketError::Conflict`]: a concurrent write won; retry
    /// - [`MarketError::StoreUnavailable`]: the store failed
    #[tracing::instrument(skip_all, fields(plot_id = %plot_id))]
    pub async fn create_booking(
        &self,
        principal: &Principal,
        plot_id: PlotId,
        note: Option<String>,
    ) -> Result<Booking, MarketError> {
        self.request(principal, plot_id, note)
            .await
            .map_err(|error| rejected(Operation::RequestBooking, error))
    }

    /// Move a pending booking to `target`.
    ///
    /// `Confirmed` sells the plot; `Cancelled` releases it.
    ///
    /// # Errors
    ///
    /// - [`MarketError::Unauthenticated`] or [`MarketError::Forbidden`]: not an admin
    /// - [`MarketError::NotFound`]: the booking or its plot does not exist
    /// - [`MarketError::InvalidTransition`]: the booking is no longer `pending`
    /// - [`MarketError::Conflict`]: a concurrent write won; retry
    /// - [`MarketError::StoreUnavailable`]: the store failed
    #[tracing::instrument(skip_all, fields(booking_id = %booking_id, target = %target))]
    pub async fn confirm_booking(
        &self,
        principal: &Principal,
        booking_id: BookingId,
        target: TargetStatus,
    ) -> Result<Booking, MarketError> {
        let operation = operation_for(target);
        self.settle(principal, operation, booking_id, target)
            .await
            .map_err(|error| rejected(operation, error))
    }

    /// Cancel a pending booking, releasing its plot.
    ///
    /// # Errors
    ///
    /// As [`confirm_booking`](Self::confirm_booking).
    pub async fn cancel_booking(
        &self,
        principal: &Principal,
        booking_id: BookingId,
    ) -> Result<Booking, MarketError> {
        self.confirm_booking(principal, booking_id, TargetStatus::Cancelled)
            .await
    }

    /// Like [`confirm_booking`](Self::confirm_booking), with the target given
    /// as a raw token.
    ///
    /// # Errors
    ///
    /// [`MarketError::InvalidRequest`] unless `target` is exactly `confirmed`
    /// or `cancelled`; no record is read in that case. Otherwise as
    /// [`confirm_booking`](Self::confirm_booking).
    pub async fn resolve_booking(
        &self,
        principal: &Principal,
        booking_id: BookingId,
        target: &str,
    ) -> Result<Booking, MarketError> {
        let target = target
            .parse::<TargetStatus>()
            .map_err(|error| rejected(Operation::ConfirmBooking, error.into()))?;
        self.confirm_booking(principal, booking_id, target).await
    }

    async fn request(
        &self,
        principal: &Principal,
        plot_id: PlotId,
        note: Option<String>,
    ) -> Result<Booking, MarketError> {
        policy::enforce(principal, Operation::RequestBooking)?;
        let Some(caller) = principal.caller() else {
            return Err(MarketError::Unauthenticated(
                "booking requires a caller".to_string(),
            ));
        };

        let loaded = repository::load_plot(self.store.as_ref(), plot_id)
            .await?
            .ok_or_else(|| MarketError::plot_not_found(plot_id))?;

        let mut state = ReservationState::for_plot(loaded.record);
        self.reducer.reduce(
            &mut state,
            ReservationAction::RequestBooking {
                booking_id: BookingId::new(),
                plot_id,
                user: caller.id,
                note,
            },
            &self.env,
        );
        let (plot, booking) = state.into_outcome()?;

        let batch = WriteBatch::new()
            .with(repository::update_plot(&plot, loaded.version)?)
            .with(repository::insert_booking(&booking)?);
        if let Err(error) = self.store.commit(batch).await {
            return Err(if error.is_conflict() {
                self.classify_request_conflict(plot_id, error).await
            } else {
                error.into()
            });
        }

        info!(
            booking_id = %booking.id,
            plot_id = %plot.id,
            user = %booking.user,
            "Booking requested"
        );
        metrics::counter!("marketplace.bookings.created").increment(1);
        Ok(booking)
    }

    async fn settle(
        &self,
        principal: &Principal,
        operation: Operation,
        booking_id: BookingId,
        target: TargetStatus,
    ) -> Result<Booking, MarketError> {
        policy::enforce(principal, operation)?;

        let booking = repository::load_booking(self.store.as_ref(), booking_id)
            .await?
            .ok_or_else(|| MarketError::booking_not_found(booking_id))?;
        let plot_id = booking.record.plot;
        let plot = repository::load_plot(self.store.as_ref(), plot_id)
            .await?
            .ok_or_else(|| MarketError::plot_not_found(plot_id))?;

        let mut state = ReservationState::for_booking(plot.record, booking.record);
        self.reducer.reduce(
            &mut state,
            ReservationAction::settle(booking_id, target),
            &self.env,
        );
        let (settled_plot, settled) = state.into_outcome()?;

        let batch = WriteBatch::new()
            .with(repository::update_booking(&settled, booking.version)?)
            .with(repository::update_plot(&settled_plot, plot.version)?);
        if let Err(error) = self.store.commit(batch).await {
            return Err(if error.is_conflict() {
                self.classify_settle_conflict(booking_id, target, error).await
            } else {
                error.into()
            });
        }

        info!(
            booking_id = %settled.id,
            plot_id = %settled_plot.id,
            booking_status = %settled.status,
            plot_status = %settled_plot.status,
            "Booking settled"
        );
        match target {
            TargetStatus::Confirmed => {
                metrics::counter!("marketplace.bookings.confirmed").increment(1);
            }
            TargetStatus::Cancelled => {
                metrics::counter!("marketplace.bookings.cancelled").increment(1);
            }
        }
        Ok(settled)
    }

    /// A lost booking race is `PlotUnavailable` if the winner now holds the plot.
    async fn classify_request_conflict(
        &self,
        plot_id: PlotId,
        error: EntityStoreError,
    ) -> MarketError {
        match repository::load_plot(self.store.as_ref(), plot_id).await {
            Ok(Some(current)) if !current.record.is_available() => MarketError::PlotUnavailable {
                plot_id,
                status: current.record.status,
            },
            Ok(None) => MarketError::plot_not_found(plot_id),
            _ => error.into(),
        }
    }

    /// A lost settle race is `InvalidTransition` if the booking has left `pending`.
    async fn classify_settle_conflict(
        &self,
        booking_id: BookingId,
        target: TargetStatus,
        error: EntityStoreError,
    ) -> MarketError {
        match repository::load_booking(self.store.as_ref(), booking_id).await {
            Ok(Some(current)) if current.record.status != BookingStatus::Pending => {
                MarketError::InvalidTransition {
                    booking_id,
                    from: current.record.status,
                    to: target.booking_status(),
                }
            }
            _ => error.into(),
        }
    }
}

const fn operation_for(target: TargetStatus) -> Operation {
    match target {
        TargetStatus::Confirmed => Operation::ConfirmBooking,
        TargetStatus::Cancelled => Operation::CancelBooking,
    }
}

fn rejected(operation: Operation, error: MarketError) -> MarketError {
    match &error {
        MarketError::Conflict(_) => {
            warn!(operation = %operation, error = %error, "Lost a concurrent write");
            metrics::counter!("marketplace.bookings.conflicts").increment(1);
        }
        MarketError::StoreUnavailable(_) | MarketError::Internal(_) => {
            warn!(operation = %operation, error = %error, "Store failure");
        }
        _ => debug!(operation = %operation, error = %error, "Request rejected"),
    }
    metrics::counter!("marketplace.bookings.rejected", "reason" => error.kind()).increment(1);
    error
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{Money, NewPlot, Plot, PlotStatus, UserId};
    use plotmarket_core::document::{Collection, Document, DocumentKey, Version};
    use plotmarket_core::entity_store::{StoreFuture, Write};
    use plotmarket_testing::{InMemoryEntityStore, test_clock};
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Interference {
        /// Rewrite the target unchanged, bumping its version
        Touch,
        /// Touch, then report the target as missing to later reads
        Vanish,
    }

    /// Lets another writer get in between the coordinator's read and its commit.
    struct InterleavingStore {
        inner: InMemoryEntityStore,
        target: DocumentKey,
        interference: Interference,
        fired: AtomicBool,
    }

    impl InterleavingStore {
        fn new(
            inner: &InMemoryEntityStore,
            target: DocumentKey,
            interference: Interference,
        ) -> Self {
            Self {
                inner: inner.clone(),
                target,
                interference,
                fired: AtomicBool::new(false),
            }
        }
    }

    impl EntityStore for InterleavingStore {
        fn get(&self, key: DocumentKey) -> StoreFuture<'_, Option<Document>> {
            Box::pin(async move {
                let hidden = self.interference == Interference::Vanish
                    && self.fired.load(Ordering::SeqCst)
                    && key == self.target;
                if hidden {
                    return Ok(None);
                }
                self.inner.get(key).await
            })
        }

        fn list(&self, collection: Collection) -> StoreFuture<'_, Vec<Document>> {
            self.inner.list(collection)
        }

        fn commit(&self, batch: WriteBatch) -> StoreFuture<'_, Vec<Version>> {
            Box::pin(async move {
                if !self.fired.swap(true, Ordering::SeqCst) {
                    if let Some(current) = self.inner.get(self.target.clone()).await? {
                        let touch = Write::update(current.key, current.version, current.body);
                        self.inner.commit(WriteBatch::new().with(touch)).await?;
                    }
                }
                self.inner.commit(batch).await
            })
        }
    }

    fn interleaved(
        store: &InMemoryEntityStore,
        target: DocumentKey,
        interference: Interference,
    ) -> ReservationCoordinator {
        ReservationCoordinator::new(
            Arc::new(InterleavingStore::new(store, target, interference)),
            Arc::new(test_clock()),
        )
    }

    async fn setup() -> (ReservationCoordinator, InMemoryEntityStore, PlotId) {
        let store = InMemoryEntityStore::new();
        let plot = Plot::list(
            PlotId::new(),
            NewPlot::new("Meadow lot", Money::from_cents(1_000_000)),
            test_clock().now(),
        );
        store
            .commit(WriteBatch::new().with(repository::insert_plot(&plot).unwrap()))
            .await
            .unwrap();
        let coordinator =
            ReservationCoordinator::new(Arc::new(store.clone()), Arc::new(test_clock()));
        (coordinator, store, plot.id)
    }

    #[tokio::test]
    async fn booking_commits_plot_and_booking_together() {
        let (coordinator, store, plot_id) = setup().await;
        let user = UserId::new();

        let booking = coordinator
            .create_booking(&Principal::customer(user), plot_id, Some("Corner".into()))
            .await
            .unwrap();

        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(store.commit_count(), 2);
        let plot = repository::load_plot(&store, plot_id).await.unwrap().unwrap();
        assert_eq!(plot.record.status, PlotStatus::Booked);
        assert_eq!(plot.record.owner, Some(user));
        assert_eq!(plot.version.value(), 2);
    }

    #[tokio::test]
    async fn anonymous_booking_is_unauthenticated() {
        let (coordinator, store, plot_id) = setup().await;

        let error = coordinator
            .create_booking(&Principal::Anonymous, plot_id, None)
            .await
            .unwrap_err();

        assert!(matches!(error, MarketError::Unauthenticated(_)));
        assert_eq!(store.commit_count(), 1);
    }

    #[tokio::test]
    async fn unknown_plot_is_not_found() {
        let (coordinator, _store, _) = setup().await;
        let missing = PlotId::new();

        let error = coordinator
            .create_booking(&Principal::customer(UserId::new()), missing, None)
            .await
            .unwrap_err();

        assert_eq!(error, MarketError::plot_not_found(missing));
    }

    #[tokio::test]
    async fn unknown_target_reads_nothing() {
        let (coordinator, _store, _) = setup().await;

        let error = coordinator
            .resolve_booking(&Principal::admin(UserId::new()), BookingId::new(), "approve")
            .await
            .unwrap_err();

        // An unknown booking would be NotFound; the token is checked first.
        assert!(matches!(error, MarketError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn missing_booking_is_not_found() {
        let (coordinator, _store, _) = setup().await;
        let missing = BookingId::new();

        let error = coordinator
            .cancel_booking(&Principal::admin(UserId::new()), missing)
            .await
            .unwrap_err();

        assert_eq!(error, MarketError::booking_not_found(missing));
    }

    #[tokio::test]
    async fn store_failure_on_commit_is_retryable() {
        let (coordinator, store, plot_id) = setup().await;
        store.fail_next_commits(1);

        let error = coordinator
            .create_booking(&Principal::customer(UserId::new()), plot_id, None)
            .await
            .unwrap_err();

        assert!(matches!(error, MarketError::StoreUnavailable(_)));
        assert!(error.is_retryable());
        let plot = repository::load_plot(&store, plot_id).await.unwrap().unwrap();
        assert_eq!(plot.record.status, PlotStatus::Available);
        assert!(repository::list_bookings(&store).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn interleaved_plot_write_is_conflict_without_booking() {
        let (_, store, plot_id) = setup().await;
        let coordinator = interleaved(&store, repository::plot_key(plot_id), Interference::Touch);

        let error = coordinator
            .create_booking(&Principal::customer(UserId::new()), plot_id, None)
            .await
            .unwrap_err();

        assert!(matches!(error, MarketError::Conflict(_)), "{error}");
        assert!(error.is_retryable());
        let plot = repository::load_plot(&store, plot_id).await.unwrap().unwrap();
        assert_eq!(plot.record.status, PlotStatus::Available);
        assert!(plot.record.owner.is_none());
        assert!(repository::list_bookings(&store).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn interleaved_booking_write_is_conflict_while_pending() {
        let (coordinator, store, plot_id) = setup().await;
        let booking = coordinator
            .create_booking(&Principal::customer(UserId::new()), plot_id, None)
            .await
            .unwrap();
        let coordinator =
            interleaved(&store, repository::booking_key(booking.id), Interference::Touch);

        let error = coordinator
            .confirm_booking(
                &Principal::admin(UserId::new()),
                booking.id,
                TargetStatus::Confirmed,
            )
            .await
            .unwrap_err();

        assert!(matches!(error, MarketError::Conflict(_)), "{error}");
        let stored = repository::load_booking(&store, booking.id).await.unwrap().unwrap();
        assert_eq!(stored.record.status, BookingStatus::Pending);
        let plot = repository::load_plot(&store, plot_id).await.unwrap().unwrap();
        assert_eq!(plot.record.status, PlotStatus::Booked);
    }

    #[tokio::test]
    async fn plot_gone_after_lost_race_is_not_found() {
        let (_, store, plot_id) = setup().await;
        let coordinator = interleaved(&store, repository::plot_key(plot_id), Interference::Vanish);

        let error = coordinator
            .create_booking(&Principal::customer(UserId::new()), plot_id, None)
            .await
            .unwrap_err();

        assert_eq!(error, MarketError::plot_not_found(plot_id));
        assert!(repository::list_bookings(&store).await.unwrap().is_empty());
    }
}
