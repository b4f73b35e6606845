//! Hand-off of queued job ids from the HTTP layer to the workers.
//!
//! The queue only carries ids. The job row is the source of truth, so a lost
//! or duplicated message is harmless: workers claim with a conditional update
//! and startup recovery re-enqueues anything still `queued`.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

/// How long a single `dequeue` waits before returning `None`.
const DEQUEUE_TIMEOUT: Duration = Duration::from_secs(5);

const REDIS_QUEUE_KEY: &str = "generation:queue";

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job_id: Uuid) -> Result<()>;

    /// Waits a bounded time for the next id. `None` means nothing arrived.
    async fn dequeue(&self) -> Result<Option<Uuid>>;
}

// ────────────────────────────────────────────────────────────────────────────
// In-process channel
// ────────────────────────────────────────────────────────────────────────────

pub struct ChannelJobQueue {
    tx: mpsc::UnboundedSender<Uuid>,
    rx: Mutex<mpsc::UnboundedReceiver<Uuid>>,
}

impl ChannelJobQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }
}

impl Default for ChannelJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for ChannelJobQueue {
    async fn enqueue(&self, job_id: Uuid) -> Result<()> {
        self.tx
            .send(job_id)
            .context("generation queue receiver dropped")
    }

    async fn dequeue(&self) -> Result<Option<Uuid>> {
        let mut rx = self.rx.lock().await;
        match tokio::time::timeout(DEQUEUE_TIMEOUT, rx.recv()).await {
            Ok(id) => Ok(id),
            Err(_) => Ok(None),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Redis list
// ────────────────────────────────────────────────────────────────────────────

/// LPUSH / BRPOP on a single list, so ids are consumed in submission order.
pub struct RedisJobQueue {
    client: redis::Client,
}

impl RedisJobQueue {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .context("Failed to connect to Redis")
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, job_id: Uuid) -> Result<()> {
        let mut conn = self.connection().await?;
        redis::cmd("LPUSH")
            .arg(REDIS_QUEUE_KEY)
            .arg(job_id.to_string())
            .query_async::<_, ()>(&mut conn)
            .await
            .context("LPUSH to generation queue failed")?;
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<Uuid>> {
        let mut conn = self.connection().await?;
        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(REDIS_QUEUE_KEY)
            .arg(DEQUEUE_TIMEOUT.as_secs())
            .query_async(&mut conn)
            .await
            .context("BRPOP from generation queue failed")?;

        match popped {
            Some((_, raw)) => {
                let id = raw
                    .parse::<Uuid>()
                    .with_context(|| format!("Malformed job id on queue: {raw}"))?;
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }
}
