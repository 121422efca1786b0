//! Non-blocking, TTL-based lock table. Named locks are meant to hold
//! across processes in a real deployment; this `DashMap`-backed table is
//! the narrowest single-process stand-in.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::domain::ports::outbound::{LockHandle, Locks};
use crate::support::errors::CoreResult;

#[derive(Default)]
pub struct InMemoryLocks {
    held: DashMap<String, (Instant, Uuid)>,
}

impl InMemoryLocks {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Locks for InMemoryLocks {
    async fn acquire(&self, name: &str, ttl_ms: u64) -> CoreResult<Option<LockHandle>> {
        let now = Instant::now();
        let token = Uuid::new_v4();
        let ttl = Duration::from_millis(ttl_ms);

        let mut acquired = false;
        self.held
            .entry(name.to_string())
            .and_modify(|(expires_at, existing_token)| {
                if *expires_at <= now {
                    *expires_at = now + ttl;
                    *existing_token = token;
                    acquired = true;
                }
            })
            .or_insert_with(|| {
                acquired = true;
                (now + ttl, token)
            });

        if acquired {
            Ok(Some(LockHandle { name: name.to_string(), token }))
        } else {
            Ok(None)
        }
    }

    async fn release(&self, handle: LockHandle) -> CoreResult<()> {
        self.held.remove_if(&handle.name, |_, (_, token)| *token == handle.token);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_fails_while_first_is_held() {
        let locks = InMemoryLocks::new();
        let first = locks.acquire("station:CB-1", 10_000).await.unwrap();
        assert!(first.is_some());
        let second = locks.acquire("station:CB-1", 10_000).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn release_frees_the_name_for_reacquisition() {
        let locks = InMemoryLocks::new();
        let handle = locks.acquire("station:CB-1", 10_000).await.unwrap().unwrap();
        locks.release(handle).await.unwrap();
        assert!(locks.acquire("station:CB-1", 10_000).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn expired_lock_can_be_reacquired() {
        let locks = InMemoryLocks::new();
        locks.acquire("station:CB-1", 1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(locks.acquire("station:CB-1", 10_000).await.unwrap().is_some());
    }
}
