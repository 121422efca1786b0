//! Deferred work scheduler.
//!
//! Deferred work (the post-boot configuration push, smart-charging
//! recomputation) is a pattern that needs an explicit
//! submit-to-scheduler-with-a-delay model rather than fire-and-forget
//! `tokio::spawn` timers, so that shutdown can drain outstanding jobs instead
//! of abandoning them mid-flight.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Semaphore};
use tracing::warn;

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Bounded-concurrency worker pool for deferred, best-effort side-effect work.
///
/// Jobs are submitted with a delay; the pool runs at most `max_concurrency`
/// of them at once. `drain` waits (bounded by a timeout) for in-flight jobs
/// to finish, so a graceful shutdown does not truncate a post-boot
/// configuration push mid-call.
#[derive(Clone)]
pub struct Scheduler {
    tx: mpsc::UnboundedSender<(Duration, Job)>,
    inflight: Arc<Semaphore>,
}

impl Scheduler {
    pub fn new(max_concurrency: usize) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<(Duration, Job)>();
        let inflight = Arc::new(Semaphore::new(max_concurrency));
        let sem = inflight.clone();

        tokio::spawn(async move {
            while let Some((delay, job)) = rx.recv().await {
                let permit_sem = sem.clone();
                tokio::spawn(async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    let Ok(_permit) = permit_sem.acquire().await else {
                        warn!("scheduler semaphore closed, dropping deferred job");
                        return;
                    };
                    job.await;
                });
            }
        });

        Self { tx, inflight }
    }

    /// Schedule `job` to run after `delay`. Best-effort: the error from
    /// `job` (if any) must be handled inside the future itself, since this
    /// queue never surfaces a result to the caller.
    pub fn submit<F>(&self, delay: Duration, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.tx.send((delay, Box::pin(job))).is_err() {
            warn!("scheduler channel closed, dropping deferred job");
        }
    }

    /// Wait until no job currently holds a concurrency permit, bounded by
    /// `timeout`. Used during shutdown to let in-flight deferred work (e.g.
    /// a post-boot configuration push) finish instead of being abandoned.
    pub async fn drain(&self, max_concurrency: usize, timeout: Duration) {
        let wait = async {
            // Acquiring every permit proves nothing else currently holds one.
            let _ = self.inflight.acquire_many(max_concurrency as u32).await;
        };
        if tokio::time::timeout(timeout, wait).await.is_err() {
            warn!("scheduler drain timed out, some deferred jobs may still be running");
        }
    }
}
