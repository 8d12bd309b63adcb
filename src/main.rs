/// Lectern - entitlement and invoicing service
use lectern::{
    config::{ServerConfig, DEFAULT_LOG_FILTER},
    server, AppContext, LmsResult,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> LmsResult<()> {
    // Load configuration
    let config = ServerConfig::from_env()?;

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_new(&config.logging.level)
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

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
    __              __
   / /   ___  _____/ /____  _________
  / /   / _ \/ ___/ __/ _ \/ ___/ __ \
 / /___/  __/ /__/ /_/  __/ /  / / / /
/_____/\___/\___/\__/\___/_/  /_/ /_/

        Entitlements & Invoicing v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
