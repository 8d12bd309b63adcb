/// Application context and dependency injection
use crate::{
    access::ContentGate,
    billing::{InvoiceManager, WalletManager},
    config::ServerConfig,
    db,
    enrollment::EnrollmentResolver,
    error::LmsResult,
    store::{LearningStore, SqliteStore},
};
use std::sync::Arc;
use std::time::Instant;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub store: Arc<dyn LearningStore>,
    // Learner-facing content access
    pub gate: ContentGate,
    // Entitlements and billing
    pub resolver: EnrollmentResolver,
    pub invoices: InvoiceManager,
    pub wallet: WalletManager,
    pub started_at: Instant,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> LmsResult<Self> {
        // Validate configuration
        config.validate()?;

        // Create data directory if it doesn't exist
        tokio::fs::create_dir_all(&config.storage.data_directory).await?;

        let pool = db::create_pool(
            &config.storage.database,
            db::DatabaseOptions {
                max_connections: config.storage.max_connections,
                enable_wal: true,
            },
        )
        .await?;

        db::run_migrations(&pool).await?;
        db::test_connection(&pool).await?;

        tracing::info!("Database ready at {}", config.storage.database.display());

        Ok(Self::with_store(config, Arc::new(SqliteStore::new(pool))))
    }

    /// Wire the services around an existing store
    pub fn with_store(config: ServerConfig, store: Arc<dyn LearningStore>) -> Self {
        let gate = ContentGate::new(store.clone(), config.access.fail_open);
        let resolver = EnrollmentResolver::new(store.clone());
        let wallet = WalletManager::new(store.clone());
        let invoices = InvoiceManager::new(store.clone(), resolver.clone(), wallet.clone());

        Self {
            config: Arc::new(config),
            store,
            gate,
            resolver,
            invoices,
            wallet,
            started_at: Instant::now(),
        }
    }
}
