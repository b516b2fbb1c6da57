//! Marketplace demo.
//!
//! Walks through the booking lifecycle against the configured store:
//! an admin lists two plots, a buyer books one and the admin confirms it,
//! a second buyer is turned away, and a cancelled booking frees the other
//! plot for rebooking.
//!
//! ```bash
//! cargo run -p marketplace --bin demo
//! STORE_BACKEND=postgres DATABASE_URL=postgres://... cargo run -p marketplace --bin demo
//! ```

use anyhow::Context;
use marketplace::auth::{UserProfile, authenticate};
use marketplace::config::{DEFAULT_LOG_FILTER, Config};
use marketplace::mocks::{InMemoryIdentityDirectory, StaticTokenVerifier};
use marketplace::types::{Coordinates, Location, Money, NewPlot};
use marketplace::{MarketError, MarketplaceApp, TargetStatus, UserId};
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let config = Config::from_env().context("loading configuration")?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_new(&config.log.filter)
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(backend = ?config.store, "Starting plot marketplace demo");

    let admin = profile("Avery Admin", "admin@plots.example", true);
    let first_buyer = profile("Blake Buyer", "blake@plots.example", false);
    let second_buyer = profile("Casey Buyer", "casey@plots.example", false);

    let verifier = StaticTokenVerifier::new()
        .with_profile("admin-token", &admin)
        .with_profile("blake-token", &first_buyer)
        .with_profile("casey-token", &second_buyer);
    let directory = InMemoryIdentityDirectory::new()
        .with_profile(admin)
        .with_profile(first_buyer)
        .with_profile(second_buyer);

    let app = MarketplaceApp::new(&config, Arc::new(directory))
        .await
        .context("starting marketplace")?;

    let admin = authenticate(&verifier, Some("Bearer admin-token")).await?;
    let blake = authenticate(&verifier, Some("Bearer blake-token")).await?;
    let casey = authenticate(&verifier, Some("Bearer casey-token")).await?;

    // 1. Admin lists two plots
    let lakeside = app
        .catalog
        .create_plot(
            &admin,
            NewPlot {
                title: "Lakeside, Sector 4".to_string(),
                description: Some("Half-acre plot with lake frontage".to_string()),
                price: Money::from_cents(7_500_000),
                location: Location {
                    sector: Some("4".to_string()),
                    plot_number: Some("4-17".to_string()),
                    coordinates: Some(Coordinates {
                        lat: 12.9716,
                        lng: 77.5946,
                    }),
                },
            },
        )
        .await?;
    let hillside = app
        .catalog
        .create_plot(&admin, NewPlot::new("Hillside, Sector 9", Money::from_cents(5_200_000)))
        .await?;

    // 2. Book and confirm
    let booking = app
        .coordinator
        .create_booking(&blake, lakeside.id, Some("Cash buyer".to_string()))
        .await?;
    tracing::info!(booking_id = %booking.id, status = %booking.status, "Blake booked Lakeside");

    let confirmed = app
        .coordinator
        .resolve_booking(&admin, booking.id, "confirmed")
        .await?;
    tracing::info!(status = %confirmed.status, "Admin confirmed Blake's booking");

    // 3. A sold plot cannot be booked again
    match app.coordinator.create_booking(&casey, lakeside.id, None).await {
        Err(MarketError::PlotUnavailable { status, .. }) => {
            tracing::info!(%status, "Casey was turned away from Lakeside");
        }
        other => anyhow::bail!("expected PlotUnavailable, got {other:?}"),
    }

    // 4. Cancel frees the plot
    let booking = app.coordinator.create_booking(&casey, hillside.id, None).await?;
    app.coordinator
        .confirm_booking(&admin, booking.id, TargetStatus::Cancelled)
        .await?;
    let rebooked = app.coordinator.create_booking(&blake, hillside.id, None).await?;
    tracing::info!(booking_id = %rebooked.id, "Blake rebooked Hillside after cancellation");

    for view in app.catalog.list_plots(&marketplace::Principal::Anonymous).await? {
        tracing::info!(
            plot = %view.plot.title,
            status = %view.plot.status,
            owner = view.owner_details.as_ref().map_or("-", |owner| owner.name.as_str()),
            "Final state"
        );
    }

    Ok(())
}

fn profile(name: &str, email: &str, is_admin: bool) -> UserProfile {
    UserProfile {
        id: UserId::new(),
        name: name.to_string(),
        email: email.to_string(),
        is_admin,
    }
}
