use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context;
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{debug, error, info, warn};

/// Something that knows how to open (and close) a handle to the backing store.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Handle: Clone + Send + Sync + 'static;

    async fn connect(&self) -> anyhow::Result<Self::Handle>;

    async fn disconnect(&self, _handle: Self::Handle) {}
}

/// Connection failure, shared by every caller that waited on the same attempt.
#[derive(Debug, Clone, thiserror::Error)]
#[error("database connection failed: {0:#}")]
pub struct ConnectError(Arc<anyhow::Error>);

type PendingConnect<H> = Shared<BoxFuture<'static, Result<H, ConnectError>>>;

enum Slot<H> {
    Empty,
    Connecting(PendingConnect<H>),
    Ready(H),
}

/// Lazily created, process-scoped store handle.
///
/// The first `acquire` starts a connection attempt; callers that arrive while
/// it is in flight await the same attempt. A failed attempt is reported to all
/// of them and leaves the cache empty, so the next `acquire` starts over.
pub struct ConnectionCache<C: Connector> {
    connector: Arc<C>,
    slot: Mutex<Slot<C::Handle>>,
}

impl<C: Connector> ConnectionCache<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector: Arc::new(connector),
            slot: Mutex::new(Slot::Empty),
        }
    }

    pub async fn acquire(&self) -> Result<C::Handle, ConnectError> {
        let pending = {
            let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
            match &*slot {
                Slot::Ready(handle) => return Ok(handle.clone()),
                Slot::Connecting(pending) => pending.clone(),
                Slot::Empty => {
                    debug!("opening store connection");
                    let connector = Arc::clone(&self.connector);
                    let pending = async move {
                        connector
                            .connect()
                            .await
                            .map_err(|e| ConnectError(Arc::new(e)))
                    }
                    .boxed()
                    .shared();
                    *slot = Slot::Connecting(pending.clone());
                    pending
                }
            }
        };

        let result = pending.clone().await;

        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Slot::Connecting(current) = &*slot {
            if current.ptr_eq(&pending) {
                *slot = match &result {
                    Ok(handle) => Slot::Ready(handle.clone()),
                    Err(e) => {
                        error!(error = %e, "store connection failed");
                        Slot::Empty
                    }
                };
            }
        }
        result
    }

    /// Drops the cached handle, letting the connector release it.
    pub async fn close(&self) {
        let previous = {
            let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *slot, Slot::Empty)
        };
        if let Slot::Ready(handle) = previous {
            self.connector.disconnect(handle).await;
            info!("store connection closed");
        }
    }
}

/// PostgreSQL connector; applies the embedded migrations once connected.
pub struct PgConnector {
    database_url: String,
    max_connections: u32,
}

impl PgConnector {
    pub fn new(database_url: impl Into<String>, max_connections: u32) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections,
        }
    }
}

#[async_trait]
impl Connector for PgConnector {
    type Handle = PgPool;

    async fn connect(&self) -> anyhow::Result<PgPool> {
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .connect(&self.database_url)
            .await
            .context("connect to database")?;

        if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
            warn!(error = %e, "migration failed; continuing");
        }

        info!(max_connections = self.max_connections, "database pool ready");
        Ok(pool)
    }

    async fn disconnect(&self, pool: PgPool) {
        pool.close().await;
    }
}

pub type PgCache = ConnectionCache<PgConnector>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingConnector {
        attempts: AtomicUsize,
        fail: AtomicBool,
        closed: AtomicUsize,
    }

    #[async_trait]
    impl Connector for Arc<CountingConnector> {
        type Handle = usize;

        async fn connect(&self) -> anyhow::Result<usize> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("refused (attempt {n})");
            }
            Ok(n)
        }

        async fn disconnect(&self, _handle: usize) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_attempt() {
        let counter = Arc::new(CountingConnector::default());
        let cache = Arc::new(ConnectionCache::new(Arc::clone(&counter)));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.acquire().await })
            })
            .collect();

        for task in tasks {
            let handle = task.await.expect("join").expect("acquire");
            assert_eq!(handle, 1);
        }
        assert_eq!(counter.attempts.load(Ordering::SeqCst), 1);

        // Cached afterwards.
        assert_eq!(cache.acquire().await.expect("acquire"), 1);
        assert_eq!(counter.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_reaches_every_waiter_and_next_call_retries() {
        let counter = Arc::new(CountingConnector::default());
        counter.fail.store(true, Ordering::SeqCst);
        let cache = ConnectionCache::new(Arc::clone(&counter));

        let (a, b, c) = tokio::join!(cache.acquire(), cache.acquire(), cache.acquire());
        for res in [a, b, c] {
            let err = res.unwrap_err();
            assert!(err.to_string().contains("refused (attempt 1)"));
        }
        assert_eq!(counter.attempts.load(Ordering::SeqCst), 1);

        counter.fail.store(false, Ordering::SeqCst);
        assert_eq!(cache.acquire().await.expect("retry succeeds"), 2);
        assert_eq!(counter.attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn close_disconnects_and_resets() {
        let counter = Arc::new(CountingConnector::default());
        let cache = ConnectionCache::new(Arc::clone(&counter));

        // Closing an empty cache is a no-op.
        cache.close().await;
        assert_eq!(counter.closed.load(Ordering::SeqCst), 0);

        cache.acquire().await.expect("acquire");
        cache.close().await;
        assert_eq!(counter.closed.load(Ordering::SeqCst), 1);

        assert_eq!(cache.acquire().await.expect("reconnect"), 2);
    }
}
