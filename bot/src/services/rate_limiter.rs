//! Sliding-window rate limiting for incoming channel messages.
//!
//! Three independent windows are kept: one global, one per channel and one
//! per sender. A message is admitted only if all of them have room.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitScope {
    Global,
    Channel,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitExceeded {
    pub scope: LimitScope,
    pub retry_after_secs: u64,
}

impl fmt::Display for RateLimitExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} rate limit exceeded, retry after {}s",
            self.scope, self.retry_after_secs
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub used: usize,
    pub limit: usize,
    pub reset_in_secs: u64,
}

#[derive(Default)]
struct Windows {
    global: VecDeque<Instant>,
    channels: HashMap<String, VecDeque<Instant>>,
    users: HashMap<String, VecDeque<Instant>>,
}

pub struct RateLimiter {
    global_limit: usize,
    channel_limit: usize,
    user_limit: usize,
    window: Duration,
    windows: Mutex<Windows>,
}

impl RateLimiter {
    pub fn new(global_limit: usize, channel_limit: usize, user_limit: usize, window: Duration) -> Self {
        Self {
            global_limit,
            channel_limit,
            user_limit,
            window,
            windows: Mutex::new(Windows::default()),
        }
    }

    /// Checks every window without consuming a slot.
    pub async fn check_all_limits(&self, channel_id: &str, user_id: Option<&str>) -> Result<(), RateLimitExceeded> {
        let mut windows = self.windows.lock().await;
        self.check_windows(&mut windows, channel_id, user_id, Instant::now())
    }

    pub async fn record_message(&self, channel_id: &str, user_id: Option<&str>) {
        let mut windows = self.windows.lock().await;
        record(&mut windows, channel_id, user_id, Instant::now());
    }

    /// Check and record under a single lock, so concurrent callers cannot
    /// both take the last slot.
    pub async fn acquire(&self, channel_id: &str, user_id: Option<&str>) -> Result<(), RateLimitExceeded> {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        self.check_windows(&mut windows, channel_id, user_id, now)?;
        record(&mut windows, channel_id, user_id, now);
        Ok(())
    }

    fn check_windows(
        &self,
        windows: &mut Windows,
        channel_id: &str,
        user_id: Option<&str>,
        now: Instant,
    ) -> Result<(), RateLimitExceeded> {
        prune_keys(&mut windows.channels, self.window, now);
        prune_keys(&mut windows.users, self.window, now);

        check(&mut windows.global, self.global_limit, self.window, now, LimitScope::Global)?;

        if let Some(hits) = windows.channels.get_mut(channel_id) {
            check(hits, self.channel_limit, self.window, now, LimitScope::Channel)?;
        }

        if let Some(user_id) = user_id {
            if let Some(hits) = windows.users.get_mut(user_id) {
                check(hits, self.user_limit, self.window, now, LimitScope::User)?;
            }
        }

        Ok(())
    }

    /// Number of channel and user keys currently tracked.
    #[cfg(test)]
    async fn tracked_keys(&self) -> usize {
        let windows = self.windows.lock().await;
        windows.channels.len() + windows.users.len()
    }

    pub async fn usage(&self, scope: LimitScope, key: &str) -> Usage {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;

        let (hits, limit) = match scope {
            LimitScope::Global => (Some(&mut windows.global), self.global_limit),
            LimitScope::Channel => (windows.channels.get_mut(key), self.channel_limit),
            LimitScope::User => (windows.users.get_mut(key), self.user_limit),
        };

        match hits {
            Some(hits) => {
                prune(hits, self.window, now);
                Usage {
                    used: hits.len(),
                    limit,
                    reset_in_secs: retry_after(hits, self.window, now),
                }
            }
            None => Usage {
                used: 0,
                limit,
                reset_in_secs: 0,
            },
        }
    }
}

fn record(windows: &mut Windows, channel_id: &str, user_id: Option<&str>, now: Instant) {
    windows.global.push_back(now);
    windows
        .channels
        .entry(channel_id.to_string())
        .or_default()
        .push_back(now);
    if let Some(user_id) = user_id {
        windows.users.entry(user_id.to_string()).or_default().push_back(now);
    }
}

/// Trims every per-key window and forgets keys with no hits left.
fn prune_keys(map: &mut HashMap<String, VecDeque<Instant>>, window: Duration, now: Instant) {
    map.retain(|_, hits| {
        prune(hits, window, now);
        !hits.is_empty()
    });
}

fn prune(hits: &mut VecDeque<Instant>, window: Duration, now: Instant) {
    while let Some(oldest) = hits.front() {
        if now.duration_since(*oldest) >= window {
            hits.pop_front();
        } else {
            break;
        }
    }
}

fn retry_after(hits: &VecDeque<Instant>, window: Duration, now: Instant) -> u64 {
    match hits.front() {
        Some(oldest) => {
            let remaining = window.saturating_sub(now.duration_since(*oldest));
            remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0)
        }
        None => 0,
    }
}

fn check(
    hits: &mut VecDeque<Instant>,
    limit: usize,
    window: Duration,
    now: Instant,
    scope: LimitScope,
) -> Result<(), RateLimitExceeded> {
    prune(hits, window, now);
    if hits.len() >= limit {
        return Err(RateLimitExceeded {
            scope,
            retry_after_secs: retry_after(hits, window, now).max(1),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_channel_limit() {
        let limiter = RateLimiter::new(100, 2, 100, Duration::from_secs(60));

        limiter.acquire("chan-a", None).await.unwrap();
        limiter.acquire("chan-a", None).await.unwrap();
        let err = limiter.acquire("chan-a", None).await.unwrap_err();
        assert_eq!(err.scope, LimitScope::Channel);
        assert!(err.retry_after_secs >= 1 && err.retry_after_secs <= 60);

        // other channels are unaffected
        limiter.acquire("chan-b", None).await.unwrap();
    }

    #[tokio::test]
    async fn test_global_limit_checked_first() {
        let limiter = RateLimiter::new(1, 10, 10, Duration::from_secs(60));
        limiter.acquire("chan-a", Some("7")).await.unwrap();
        let err = limiter.check_all_limits("chan-b", Some("8")).await.unwrap_err();
        assert_eq!(err.scope, LimitScope::Global);
    }

    #[tokio::test]
    async fn test_user_limit() {
        let limiter = RateLimiter::new(10, 10, 1, Duration::from_secs(60));
        limiter.acquire("chan-a", Some("7")).await.unwrap();
        let err = limiter.acquire("chan-b", Some("7")).await.unwrap_err();
        assert_eq!(err.scope, LimitScope::User);
        limiter.acquire("chan-b", None).await.unwrap();
    }

    #[tokio::test]
    async fn test_check_does_not_consume() {
        let limiter = RateLimiter::new(1, 1, 1, Duration::from_secs(60));
        for _ in 0..3 {
            limiter.check_all_limits("chan-a", None).await.unwrap();
        }
        assert_eq!(limiter.usage(LimitScope::Global, "").await.used, 0);
    }

    #[tokio::test]
    async fn test_window_slides() {
        let limiter = RateLimiter::new(1, 1, 1, Duration::from_millis(50));
        limiter.acquire("chan-a", None).await.unwrap();
        assert!(limiter.acquire("chan-a", None).await.is_err());

        tokio::time::sleep(Duration::from_millis(80)).await;
        limiter.acquire("chan-a", None).await.unwrap();

        let usage = limiter.usage(LimitScope::Channel, "chan-a").await;
        assert_eq!(usage.used, 1);
        assert_eq!(usage.limit, 1);
    }

    #[tokio::test]
    async fn test_concurrent_acquire_respects_limit() {
        let limit = 3;
        let limiter = Arc::new(RateLimiter::new(100, limit, 100, Duration::from_secs(60)));

        let handles: Vec<_> = (0..limit + 5)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.acquire("chan-a", None).await.is_ok() })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, limit);
        assert_eq!(limiter.usage(LimitScope::Channel, "chan-a").await.used, limit);
    }

    #[tokio::test]
    async fn test_idle_keys_are_dropped() {
        let limiter = RateLimiter::new(100, 10, 10, Duration::from_millis(40));
        limiter.acquire("chan-a", Some("7")).await.unwrap();
        limiter.acquire("chan-b", Some("8")).await.unwrap();
        assert_eq!(limiter.tracked_keys().await, 4);

        tokio::time::sleep(Duration::from_millis(60)).await;
        limiter.acquire("chan-c", None).await.unwrap();
        assert_eq!(limiter.tracked_keys().await, 1);
    }
}
