/// Repute - review aggregation service
///
/// Pulls customer reviews from Google Business Profile, Booking.com and
/// scraping jobs into one store per business, with statistics, replies and
/// an embeddable widget.

mod api;
mod auth;
mod config;
mod context;
mod credentials;
mod db;
mod error;
mod metrics;
mod oauth;
mod reviews;
mod server;
mod sources;
mod sync;
#[cfg(test)]
mod testing;

use config::ServerConfig;
use context::AppContext;
use error::AppResult;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> AppResult<()> {
    // Load configuration
    let config = ServerConfig::from_env()?;

    // Initialize logging
    let registry = tracing_subscriber::registry().with(config.logging.filter());
    if config.logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // Print banner
    print_banner();

    // Create application context
    let ctx = AppContext::new(config).await?;

    // Start server
    server::serve(ctx).await?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
    ____                   __
   / __ \___  ____  __  __/ /____
  / /_/ / _ \/ __ \/ / / / __/ _ \
 / _, _/  __/ /_/ / /_/ / /_/  __/
/_/ |_|\___/ .___/\__,_/\__/\___/
          /_/

        Review aggregation service v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
