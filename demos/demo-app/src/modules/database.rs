use modstrap::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

pub const DATABASE: &str = "database";

/// Stand-in for a connection pool.
pub struct Database {
    url: String,
    connected: AtomicBool,
}

impl Database {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connected: AtomicBool::new(false),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub async fn query(&self, sql: &str) -> anyhow::Result<Vec<String>> {
        anyhow::ensure!(self.is_connected(), "database is not connected");
        tracing::debug!(%sql, "query");
        Ok(vec!["alice".to_string(), "bob".to_string()])
    }
}

#[async_trait]
impl OnModuleInit for Database {
    async fn on_module_init(&self, ctx: HookContext) -> anyhow::Result<()> {
        tracing::info!(url = %self.url, "Connecting to database...");
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(50)) => {}
            _ = ctx.cancellation_token().cancelled() => anyhow::bail!("connect cancelled"),
        }
        self.connected.store(true, Ordering::Release);
        Ok(())
    }
}

#[async_trait]
impl OnModuleDestroy for Database {
    async fn on_module_destroy(&self) -> anyhow::Result<()> {
        tracing::info!("Closing database connections");
        self.connected.store(false, Ordering::Release);
        Ok(())
    }
}

#[module(id = "database")]
pub struct DatabaseModule {
    pub url: String,
}

impl Module for DatabaseModule {
    fn register(&self, registrar: &mut Registrar<'_>) -> anyhow::Result<()> {
        let db = Arc::new(Database::new(self.url.clone()));
        registrar.register_service_arc(DATABASE, Arc::clone(&db))?;
        registrar.register_hook(
            HookDescriptor::from_init("db.connect", Arc::clone(&db))
                .priority(100)
                .timeout(Duration::from_secs(5))
                .critical(),
        )?;
        registrar.register_destroy("db.close", Duration::from_secs(5), db);
        Ok(())
    }
}
