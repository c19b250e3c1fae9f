//! Recent request capture, kept per user in a bounded ring buffer.
//!
//! Both dimensions are bounded: each user keeps at most `capacity`
//! requests, and only the `max_users` most recently active users are kept.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use lru::LruCache;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::auth::AuthUser;

/// Requests kept per user unless configured otherwise.
pub const DEFAULT_CAPACITY: usize = 100;

/// Users tracked at once unless configured otherwise.
pub const DEFAULT_MAX_USERS: usize = 1_000;

/// One captured request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedRequest {
    pub method: String,
    pub path: String,
    pub status: u16,
    pub duration_ms: u64,
    pub timestamp: String,
}

/// In-memory log of recent requests, oldest evicted first.
#[derive(Debug, Clone)]
pub struct RequestLog {
    capacity: usize,
    entries: Arc<RwLock<LruCache<String, VecDeque<CapturedRequest>>>>,
}

impl RequestLog {
    pub fn new(capacity: usize) -> Self {
        Self::with_max_users(capacity, DEFAULT_MAX_USERS)
    }

    /// Log keeping `capacity` requests for each of at most `max_users` users.
    pub fn with_max_users(capacity: usize, max_users: usize) -> Self {
        let max_users = NonZeroUsize::new(max_users).unwrap_or(NonZeroUsize::MIN);
        Self {
            capacity: capacity.max(1),
            entries: Arc::new(RwLock::new(LruCache::new(max_users))),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a request, evicting the least recently active user when full.
    pub async fn record(&self, user_id: &str, request: CapturedRequest) {
        let mut entries = self.entries.write().await;
        let buffer = entries.get_or_insert_mut(user_id.to_string(), VecDeque::new);
        if buffer.len() == self.capacity {
            buffer.pop_front();
        }
        buffer.push_back(request);
    }

    /// Most recent requests for `user_id`, newest first.
    pub async fn recent(&self, user_id: &str, limit: usize) -> Vec<CapturedRequest> {
        let entries = self.entries.read().await;
        entries
            .peek(user_id)
            .map(|buffer| buffer.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for RequestLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Middleware recording every identified request after it completes.
pub async fn capture_requests(State(log): State<RequestLog>, request: Request, next: Next) -> Response {
    let caller = AuthUser::from_headers(request.headers());
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    if let Some(caller) = caller {
        let captured = CapturedRequest {
            method,
            path,
            status: response.status().as_u16(),
            duration_ms: started.elapsed().as_millis() as u64,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        log.record(&caller.user_id, captured).await;
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn captured(path: &str) -> CapturedRequest {
        CapturedRequest {
            method: "GET".into(),
            path: path.into(),
            status: 200,
            duration_ms: 1,
            timestamp: "2024-01-01T00:00:00Z".into(),
        }
    }

    #[tokio::test]
    async fn evicts_oldest_when_full() {
        let log = RequestLog::new(2);
        log.record("u1", captured("/a")).await;
        log.record("u1", captured("/b")).await;
        log.record("u1", captured("/c")).await;

        let paths: Vec<_> = log.recent("u1", 10).await.into_iter().map(|r| r.path).collect();
        assert_eq!(paths, vec!["/c", "/b"]);
    }

    #[tokio::test]
    async fn keeps_users_apart() {
        let log = RequestLog::default();
        log.record("u1", captured("/a")).await;
        log.record("u2", captured("/b")).await;

        assert_eq!(log.recent("u1", 10).await.len(), 1);
        assert_eq!(log.recent("u3", 10).await.len(), 0);
        assert_eq!(log.recent("u2", 0).await.len(), 0);
    }

    #[tokio::test]
    async fn forgets_least_recently_active_user() {
        let log = RequestLog::with_max_users(5, 2);
        log.record("u1", captured("/a")).await;
        log.record("u2", captured("/b")).await;
        log.record("u1", captured("/c")).await;
        log.record("u3", captured("/d")).await;

        assert!(log.recent("u2", 10).await.is_empty());
        assert_eq!(log.recent("u1", 10).await.len(), 2);
        assert_eq!(log.recent("u3", 10).await.len(), 1);

        for i in 0..50 {
            log.record(&format!("visitor-{i}"), captured("/x")).await;
        }
        assert_eq!(log.entries.read().await.len(), 2);
    }
}
