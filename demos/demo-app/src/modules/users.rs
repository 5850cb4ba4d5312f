use super::cache::{CACHE, Cache};
use modstrap::prelude::*;
use std::sync::Mutex;
use std::time::Duration;

pub const USERS: &str = "users";

#[derive(Default)]
pub struct UserDirectory {
    names: Mutex<Vec<String>>,
}

impl UserDirectory {
    pub fn names(&self) -> Vec<String> {
        self.names.lock().map(|n| n.clone()).unwrap_or_default()
    }
}

#[module(id = "users", dependencies = ["database", "cache"])]
pub struct UsersModule;

impl Module for UsersModule {
    fn register(&self, registrar: &mut Registrar<'_>) -> anyhow::Result<()> {
        registrar.register_service(USERS, UserDirectory::default())?;
        registrar.register_hook(
            HookDescriptor::new("users.load", |ctx| async move {
                let unusable = ctx.unusable_dependencies();
                if !unusable.is_empty() {
                    tracing::warn!(?unusable, "Loading users without some dependencies");
                }

                let directory = ctx.container().get::<UserDirectory>(USERS)?;
                let cache = ctx.container().get::<Cache>(CACHE)?;
                let mut loaded = Vec::new();
                for key in ["user:alice", "user:bob"] {
                    if let Some(name) = cache.get(key).await {
                        loaded.push(name);
                    }
                }
                tracing::info!(users = loaded.len(), "User directory loaded");
                if let Ok(mut names) = directory.names.lock() {
                    *names = loaded;
                }
                Ok(())
            })
            .dependencies(["db.connect", "cache.warm"]),
        )?;

        registrar.register_graceful("users.drain", Duration::from_secs(2), || async {
            tracing::info!("Draining user sessions");
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(())
        });
        Ok(())
    }
}
