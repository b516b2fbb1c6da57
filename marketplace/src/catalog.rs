//! Plot listing, lookup and creation.
//!
//! Reads join each plot's owner against the [`IdentityDirectory`]. The join
//! is presentation only; it never affects plot state.

use crate::auth::{IdentityDirectory, OwnerSummary, Principal};
use crate::error::MarketError;
use crate::policy::{self, Operation};
use crate::repository;
use crate::types::{NewPlot, Plot, PlotId};
use plotmarket_core::entity_store::{EntityStore, WriteBatch};
use plotmarket_core::environment::Clock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A plot as shown to readers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlotView {
    /// The stored plot
    #[serde(flatten)]
    pub plot: Plot,
    /// Who holds it, when the directory knows the owner
    pub owner_details: Option<OwnerSummary>,
}

/// Plot catalog over the entity store.
#[derive(Clone)]
pub struct PlotCatalog {
    store: Arc<dyn EntityStore>,
    directory: Arc<dyn IdentityDirectory>,
    clock: Arc<dyn Clock>,
}

impl PlotCatalog {
    /// Create a catalog.
    #[must_use]
    pub fn new(
        store: Arc<dyn EntityStore>,
        directory: Arc<dyn IdentityDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            directory,
            clock,
        }
    }

    /// Every plot, with owner details.
    ///
    /// # Errors
    ///
    /// [`MarketError::StoreUnavailable`] if the store fails.
    pub async fn list_plots(&self, principal: &Principal) -> Result<Vec<PlotView>, MarketError> {
        policy::enforce(principal, Operation::ListPlots)?;
        let plots = repository::list_plots(self.store.as_ref()).await?;

        let mut views = Vec::with_capacity(plots.len());
        for plot in plots {
            views.push(self.view(plot).await);
        }
        Ok(views)
    }

    /// One plot, with owner details.
    ///
    /// # Errors
    ///
    /// [`MarketError::NotFound`] if the plot does not exist.
    pub async fn get_plot(
        &self,
        principal: &Principal,
        plot_id: PlotId,
    ) -> Result<PlotView, MarketError> {
        policy::enforce(principal, Operation::GetPlot)?;
        let plot = repository::load_plot(self.store.as_ref(), plot_id)
            .await?
            .ok_or_else(|| MarketError::plot_not_found(plot_id))?;
        Ok(self.view(plot.record).await)
    }

    /// List a new plot. It starts `available` with no owner.
    ///
    /// # Errors
    ///
    /// - [`MarketError::Unauthenticated`] or [`MarketError::Forbidden`]: not an admin
    /// - [`MarketError::InvalidInput`]: the fields fail validation
    /// - [`MarketError::StoreUnavailable`]: the store failed
    #[tracing::instrument(skip_all, fields(title = %input.title))]
    pub async fn create_plot(
        &self,
        principal: &Principal,
        input: NewPlot,
    ) -> Result<Plot, MarketError> {
        policy::enforce(principal, Operation::CreatePlot)?;
        input.validate().map_err(MarketError::InvalidInput)?;

        let plot = Plot::list(PlotId::new(), input, self.clock.now());
        self.store
            .commit(WriteBatch::new().with(repository::insert_plot(&plot)?))
            .await?;

        tracing::info!(plot_id = %plot.id, price = %plot.price, "Plot listed");
        metrics::counter!("marketplace.plots.created").increment(1);
        Ok(plot)
    }

    async fn view(&self, plot: Plot) -> PlotView {
        let owner_details = match plot.owner {
            Some(owner) => self.directory.profile(owner).await.map(OwnerSummary::from),
            None => None,
        };
        PlotView {
            plot,
            owner_details,
        }
    }
}
