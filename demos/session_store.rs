//! Session Store Example
//!
//! Walks through the cache and session adapters: a named cache, a session
//! lifecycle through the DAO, and typed storage.
//!
//! Run against Redis (configured with `REDIS_*` variables):
//!     cargo run --example session_store
//!
//! Run without a server:
//!     cargo run --example session_store -- --memory

use redis_security_store::backends::MemoryStore;
use redis_security_store::{Cache, Session, StoreConfig, StoreSystem, StoreSystemBuilder};
use std::collections::HashMap;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let system = if std::env::args().any(|arg| arg == "--memory") {
        StoreSystemBuilder::new()
            .with_config(StoreConfig::default())
            .with_connection_factory(Arc::new(Arc::new(MemoryStore::new()).factory()))
            .build()
            .await?
    } else {
        StoreSystem::new().await?
    };

    if !system.health_check().await {
        anyhow::bail!("store is not reachable");
    }

    // 1. Authorization cache
    let roles = system
        .cache_manager()
        .get_cache::<String, Vec<String>>("authorizationCache");
    roles.put("alice".into(), vec!["admin".into(), "auditor".into()]).await?;
    tracing::info!(roles = ?roles.get(&"alice".to_string()).await?, "Cached roles for alice");
    tracing::info!(entries = roles.size().await?, "authorizationCache size");

    // 2. Session lifecycle
    let dao = system.session_dao();
    let mut session = Session::new(30 * 60 * 1000).with_host("127.0.0.1");
    session.set_attribute("principal", serde_json::json!("alice"));
    let id = dao.create(&mut session).await?;
    tracing::info!(session_id = %id, "Created session");

    session.touch();
    dao.update(&session).await?;
    let loaded = dao.read(&id).await?;
    tracing::info!(principal = ?loaded.attribute("principal"), "Loaded session");
    tracing::info!(active = dao.active_sessions().await?.len(), "Active sessions");

    // 3. Typed storage
    let store = system.store();
    let quotas = HashMap::from([("alice".to_string(), 10u32), ("bob".to_string(), 5)]);
    store.hash_set("quotas", &quotas).await?;
    store.hash_remove_fields("quotas", &["bob"]).await?;
    let remaining: HashMap<String, u32> = store.hash_get_all("quotas").await?;
    tracing::info!(?remaining, "Quotas after removing bob");

    // Cleanup
    dao.delete(&session).await?;
    roles.clear().await?;
    store.delete_object("quotas").await?;

    if let Some(stats) = store.pool_stats() {
        tracing::info!(?stats, "Pool statistics");
    }
    system.shutdown();
    Ok(())
}
