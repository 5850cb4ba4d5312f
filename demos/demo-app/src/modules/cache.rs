use super::database::{DATABASE, Database};
use modstrap::prelude::*;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

pub const CACHE: &str = "cache";

#[derive(Default)]
pub struct Cache {
    entries: RwLock<HashMap<String, String>>,
}

impl Cache {
    pub async fn get(&self, key: &str) -> Option<String> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn put(&self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.write().await.insert(key.into(), value.into());
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[module(id = "cache", dependencies = ["database"])]
pub struct CacheModule {
    /// Make warm-up fail to show a degraded start.
    pub fail_warmup: bool,
}

impl Module for CacheModule {
    fn register(&self, registrar: &mut Registrar<'_>) -> anyhow::Result<()> {
        registrar.register_service(CACHE, Cache::default())?;

        let fail = self.fail_warmup;
        registrar.register_hook(
            HookDescriptor::new("cache.warm", move |ctx| async move {
                if fail {
                    anyhow::bail!("upstream cache unavailable");
                }
                if !ctx.dependency_succeeded("db.connect") {
                    tracing::warn!("Database unavailable, starting with a cold cache");
                    return Ok(());
                }
                let db = ctx.container().get::<Database>(DATABASE)?;
                let cache = ctx.container().get::<Cache>(CACHE)?;
                for user in db.query("SELECT name FROM users").await? {
                    cache.put(format!("user:{user}"), user).await;
                }
                let entries = cache.len().await;
                tracing::info!(entries, "Cache warmed");
                Ok(())
            })
            .depends_on("db.connect")
            .priority(50)
            .timeout(Duration::from_secs(2)),
        )?;

        registrar.register_forced("cache.flush", Duration::from_millis(100), || {
            tracing::info!("Dropping cache without flushing");
            Ok(())
        });
        Ok(())
    }
}
