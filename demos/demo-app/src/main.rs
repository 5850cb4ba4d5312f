use modstrap::prelude::*;

mod modules;

use modules::users::{USERS, UserDirectory};
use modules::{CacheModule, DatabaseModule, UsersModule};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    tracing::info!("Starting demo application...");

    let url = std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/demo".to_string());
    let fail_warmup = std::env::var("DEMO_FAIL_CACHE").is_ok_and(|v| v == "1");

    let app = match Application::builder()
        .module(ModuleDescriptor::of(UsersModule))
        .module(ModuleDescriptor::of(CacheModule { fail_warmup }))
        .module(ModuleDescriptor::of(DatabaseModule { url }))
        .start()
        .await
    {
        Ok(app) => app,
        Err(e) => {
            eprintln!("fatal: {e}");
            std::process::exit(1);
        }
    };

    if let Ok(directory) = app.container().get::<UserDirectory>(USERS) {
        tracing::info!(users = ?directory.names(), "Ready");
    }
    println!("{}", app.status_json());

    tracing::info!("Press Ctrl+C to stop (twice to force)");
    let outcome = app.wait_for_shutdown().await;
    if let Some(report) = outcome.graceful.filter(|r| !r.is_clean()) {
        tracing::warn!(failed = ?report.failed, timed_out = ?report.timed_out, "Unclean shutdown");
    }
}
