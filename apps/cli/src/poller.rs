//! Polls a job's status until it settles.
//!
//! One request at a time: the next tick is not awaited until the previous
//! response has been handled, and ticks missed meanwhile are skipped. Each
//! request still carries a sequence number so a response older than the last
//! applied one can never overwrite newer state.

use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::{JobStatusView, StatusSource};
use crate::error::ClientError;
use crate::session::{JobRecord, Session, SessionStore};

pub const POLL_INTERVAL: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Terminal status or outputs available.
    Settled(JobRecord),
    /// The server rejected our credentials.
    Unauthorized,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Stale,
    Updated,
    Settled,
}

/// Folds status responses into a `JobRecord`, in request order.
#[derive(Debug)]
pub struct Reconciler {
    record: JobRecord,
    next_seq: u64,
    last_applied: Option<u64>,
}

impl Reconciler {
    pub fn new(record: JobRecord) -> Self {
        Self {
            record,
            next_seq: 0,
            last_applied: None,
        }
    }

    /// Sequence number for the next outgoing request.
    pub fn issue(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    pub fn apply(&mut self, seq: u64, view: &JobStatusView) -> Applied {
        if self.last_applied.is_some_and(|last| seq <= last) {
            return Applied::Stale;
        }
        self.last_applied = Some(seq);
        self.record.apply(view);
        if self.is_settled() {
            Applied::Settled
        } else {
            Applied::Updated
        }
    }

    pub fn is_settled(&self) -> bool {
        self.record.status.is_terminal() || self.record.has_outputs()
    }

    pub fn record(&self) -> &JobRecord {
        &self.record
    }
}

pub struct JobPoller<S> {
    source: S,
    interval: Duration,
}

impl<S: StatusSource> JobPoller<S> {
    pub fn new(source: S) -> Self {
        Self::with_interval(source, POLL_INTERVAL)
    }

    pub fn with_interval(source: S, interval: Duration) -> Self {
        Self { source, interval }
    }

    /// Polls `job_id` until it settles, the server rejects the session, or
    /// `cancel` fires. Every applied response updates `session`, which is
    /// written to `store` when the job settles or polling is cancelled.
    pub async fn watch(
        &self,
        job_id: Uuid,
        session: &mut Session,
        store: &SessionStore,
        cancel: &CancellationToken,
    ) -> Result<PollOutcome, ClientError> {
        let mut reconciler = Reconciler::new(session.record_submitted(job_id).clone());
        if reconciler.is_settled() {
            return Ok(PollOutcome::Settled(reconciler.record().clone()));
        }

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return stop(session, store),
                _ = ticker.tick() => {}
            }

            let seq = reconciler.issue();
            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return stop(session, store),
                response = self.source.job_status(job_id) => response,
            };

            match response {
                Ok(view) => match reconciler.apply(seq, &view) {
                    Applied::Stale => debug!(%job_id, seq, "Dropped stale status response"),
                    Applied::Updated => {
                        debug!(%job_id, status = view.status.as_str(), "Job still in progress");
                        session.upsert_job(reconciler.record().clone());
                    }
                    Applied::Settled => {
                        let record = reconciler.record().clone();
                        info!(%job_id, status = record.status.as_str(), "Job settled");
                        session.upsert_job(record.clone());
                        store.save(session)?;
                        return Ok(PollOutcome::Settled(record));
                    }
                },
                Err(e) if e.requires_reauth() => {
                    warn!(%job_id, "Status request unauthorized, stopping");
                    return Ok(PollOutcome::Unauthorized);
                }
                Err(e) => warn!(%job_id, "Status request failed, retrying next tick: {e}"),
            }
        }
    }
}

/// Persists what has been applied so far. An in-flight response is dropped.
fn stop(session: &Session, store: &SessionStore) -> Result<PollOutcome, ClientError> {
    store.save(session)?;
    Ok(PollOutcome::Cancelled)
}
