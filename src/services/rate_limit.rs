// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-user quota tracking against provider time windows.
//!
//! The governor never sleeps: a denied check returns the window that is full
//! and when it frees up, and the caller decides whether to pause.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// One provider rate-limit tier, e.g. 100 requests per 15 minutes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaWindow {
    pub name: String,
    pub limit: u32,
    pub window_ms: u64,
}

impl QuotaWindow {
    pub fn new(name: impl Into<String>, limit: u32, window_ms: u64) -> Self {
        Self {
            name: name.into(),
            limit,
            window_ms,
        }
    }

    /// Published provider defaults: 100 per 15 minutes and 1000 per day.
    pub fn provider_defaults() -> Vec<Self> {
        vec![
            Self::new("short", 100, 15 * 60 * 1000),
            Self::new("daily", 1000, 24 * 60 * 60 * 1000),
        ]
    }

    pub fn duration(&self) -> Duration {
        Duration::milliseconds(i64::try_from(self.window_ms).unwrap_or(i64::MAX))
    }
}

/// Kind of provider endpoint a request consumed quota on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointClass {
    List,
    Detail,
    Photos,
}

/// Result of a pre-flight quota check.
#[derive(Debug, Clone, PartialEq)]
pub struct QuotaDecision {
    pub allowed: bool,
    /// Name of the first exhausted window (shortest first)
    pub limit_type: Option<String>,
    /// When the exhausted window admits another request
    pub reset_at: Option<DateTime<Utc>>,
}

impl QuotaDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            limit_type: None,
            reset_at: None,
        }
    }
}

struct UserUsage {
    /// Request times, oldest first
    entries: VecDeque<DateTime<Utc>>,
    last_touched: u64,
}

/// Process-wide usage log keyed by user, bounded to `capacity` users with
/// least-recently-used eviction. Construct once and share by `Arc`.
pub struct UsageStore {
    users: DashMap<String, UserUsage>,
    capacity: usize,
    tick: AtomicU64,
}

impl UsageStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            users: DashMap::new(),
            capacity: capacity.max(1),
            tick: AtomicU64::new(0),
        }
    }

    fn next_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.users.contains_key(user_id)
    }

    /// Number of usage entries currently retained for a user.
    pub fn recorded(&self, user_id: &str) -> usize {
        self.users
            .get(user_id)
            .map(|u| u.entries.len())
            .unwrap_or(0)
    }

    fn append(&self, user_id: &str, at: DateTime<Utc>) {
        let tick = self.next_tick();
        {
            let mut usage = self
                .users
                .entry(user_id.to_string())
                .or_insert_with(|| UserUsage {
                    entries: VecDeque::new(),
                    last_touched: tick,
                });
            usage.entries.push_back(at);
            usage.last_touched = tick;
        }
        // The entry guard above must be released before scanning the map.
        self.evict_over_capacity(user_id);
    }

    /// Prune stale entries for `user_id` and run `f` over what remains.
    /// Unknown users are not inserted.
    fn inspect<R>(
        &self,
        user_id: &str,
        cutoff: DateTime<Utc>,
        f: impl FnOnce(&VecDeque<DateTime<Utc>>) -> R,
    ) -> Option<R> {
        let tick = self.next_tick();
        let mut usage = self.users.get_mut(user_id)?;
        while usage.entries.front().is_some_and(|at| *at <= cutoff) {
            usage.entries.pop_front();
        }
        usage.last_touched = tick;
        Some(f(&usage.entries))
    }

    fn evict_over_capacity(&self, keep: &str) {
        while self.users.len() > self.capacity {
            let victim = self
                .users
                .iter()
                .filter(|e| e.key() != keep)
                .min_by_key(|e| e.value().last_touched)
                .map(|e| e.key().clone());

            match victim {
                Some(user_id) => {
                    self.users.remove(&user_id);
                    tracing::debug!(user_id = %user_id, "Evicted least-recently-used quota log");
                }
                None => break,
            }
        }
    }
}

/// Gates outbound provider calls against every configured window.
#[derive(Clone)]
pub struct RateLimitGovernor {
    /// Sorted shortest first
    windows: Vec<QuotaWindow>,
    usage: Arc<UsageStore>,
}

impl RateLimitGovernor {
    pub fn new(mut windows: Vec<QuotaWindow>, usage: Arc<UsageStore>) -> Self {
        windows.sort_by_key(|w| w.window_ms);
        Self { windows, usage }
    }

    pub fn usage(&self) -> &Arc<UsageStore> {
        &self.usage
    }

    pub fn check_quota(&self, user_id: &str) -> QuotaDecision {
        self.check_quota_at(user_id, Utc::now())
    }

    /// Evaluate all windows at `now`, returning the first exhausted one.
    pub fn check_quota_at(&self, user_id: &str, now: DateTime<Utc>) -> QuotaDecision {
        let Some(longest) = self.windows.last() else {
            return QuotaDecision::allow();
        };
        let prune_cutoff = now - longest.duration();

        let denial = self
            .usage
            .inspect(user_id, prune_cutoff, |entries| {
                self.windows.iter().find_map(|window| {
                    let cutoff = now - window.duration();
                    let mut in_window = entries.iter().filter(|at| **at > cutoff);
                    let oldest = in_window.next();
                    let count = oldest.map_or(0, |_| 1 + in_window.count());

                    (count >= window.limit as usize).then(|| {
                        let reset_at = oldest.map_or(now, |at| *at) + window.duration();
                        (window.name.clone(), reset_at)
                    })
                })
            })
            .flatten()
            .or_else(|| {
                // A zero limit denies even users with no recorded usage.
                self.windows
                    .iter()
                    .find(|w| w.limit == 0)
                    .map(|w| (w.name.clone(), now + w.duration()))
            });

        match denial {
            Some((limit_type, reset_at)) => {
                tracing::debug!(user_id, limit_type = %limit_type, %reset_at, "Quota exhausted");
                QuotaDecision {
                    allowed: false,
                    limit_type: Some(limit_type),
                    reset_at: Some(reset_at),
                }
            }
            None => QuotaDecision::allow(),
        }
    }

    /// Record a request that reached the provider.
    pub fn record_request(&self, user_id: &str, class: EndpointClass) {
        self.record_request_at(user_id, class, Utc::now());
    }

    /// Every endpoint class draws on the same windows; the class is kept
    /// for the trace log only.
    pub fn record_request_at(&self, user_id: &str, class: EndpointClass, at: DateTime<Utc>) {
        tracing::trace!(user_id, class = ?class, "Quota usage recorded");
        self.usage.append(user_id, at);
    }
}
