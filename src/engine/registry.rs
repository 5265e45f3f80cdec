// SPDX-License-Identifier: Apache-2.0

//! Pool Registry
//!
//! In-memory map from session id to live pool. This is the only place that
//! answers "is this session connected".

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::RwLock;

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::types::SessionId;

/// A registered session and the pool it owns
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub pool: PgPool,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    last_used: Mutex<Instant>,
}

impl Session {
    pub fn new(id: SessionId, pool: PgPool, display_name: impl Into<String>) -> Self {
        Self {
            id,
            pool,
            display_name: display_name.into(),
            created_at: Utc::now(),
            last_used: Mutex::new(Instant::now()),
        }
    }

    pub fn touch(&self) {
        *self.last_used.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_used.lock().elapsed()
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.id,
            display_name: self.display_name.clone(),
            created_at: self.created_at,
            idle_secs: self.idle_for().as_secs(),
            pool_size: self.pool.size(),
            pool_idle: self.pool.num_idle(),
        }
    }
}

/// Serializable view of a session, without the pool handle
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    pub idle_secs: u64,
    pub pool_size: u32,
    pub pool_idle: usize,
}

/// Registry of live sessions, injected wherever a session must be resolved
pub struct PoolRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    max_sessions: usize,
}

impl PoolRegistry {
    pub const DEFAULT_MAX_SESSIONS: usize = 64;

    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions,
        }
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    /// Resolves a session id to its live session.
    pub async fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        let sessions = self.sessions.read().await;
        sessions.get(&id).cloned()
    }

    /// Registers a session.
    ///
    /// A registered id is never replaced, and inserts beyond `max_sessions`
    /// are refused. The caller owns the pool of a refused session.
    pub async fn insert(&self, session: Session) -> EngineResult<Arc<Session>> {
        let mut sessions = self.sessions.write().await;

        if sessions.contains_key(&session.id) {
            return Err(EngineError::connection_failed(format!(
                "Session {} is already registered",
                session.id
            )));
        }
        if sessions.len() >= self.max_sessions {
            return Err(EngineError::CapacityReached {
                max_sessions: self.max_sessions,
            });
        }

        let session = Arc::new(session);
        sessions.insert(session.id, Arc::clone(&session));
        Ok(session)
    }

    pub async fn remove(&self, id: SessionId) -> Option<Arc<Session>> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(&id)
    }

    /// Marks a session as used. Returns false when the id is unknown.
    pub async fn touch(&self, id: SessionId) -> bool {
        match self.get(id).await {
            Some(session) => {
                session.touch();
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub async fn list(&self) -> Vec<SessionInfo> {
        let sessions = self.sessions.read().await;
        let mut infos: Vec<SessionInfo> = sessions.values().map(|s| s.info()).collect();
        infos.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        infos
    }

    /// Unregisters every session idle for longer than `ttl` and hands them back
    /// so their pools can be closed outside the lock.
    pub async fn sweep_idle(&self, ttl: Duration) -> Vec<Arc<Session>> {
        let mut sessions = self.sessions.write().await;
        let expired: Vec<SessionId> = sessions
            .values()
            .filter(|s| s.idle_for() > ttl)
            .map(|s| s.id)
            .collect();

        expired
            .into_iter()
            .filter_map(|id| sessions.remove(&id))
            .collect()
    }

    /// Unregisters everything.
    pub async fn drain(&self) -> Vec<Arc<Session>> {
        let mut sessions = self.sessions.write().await;
        sessions.drain().map(|(_, s)| s).collect()
    }
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_SESSIONS)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

    /// A pool that never connects unless something acquires from it.
    pub(crate) fn lazy_pool() -> PgPool {
        let options = PgConnectOptions::new()
            .host("127.0.0.1")
            .port(1)
            .username("nobody")
            .database("nothing");
        PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy_with(options)
    }

    fn session() -> Session {
        Session::new(SessionId::new(), lazy_pool(), "nobody@127.0.0.1:1/nothing")
    }

    #[tokio::test]
    async fn test_insert_get_remove() {
        let registry = PoolRegistry::default();
        assert!(registry.is_empty().await);

        let inserted = registry.insert(session()).await.expect("insert failed");
        let id = inserted.id;
        assert_eq!(registry.len().await, 1);
        assert_eq!(registry.get(id).await.map(|s| s.id), Some(id));
        assert!(registry.get(SessionId::new()).await.is_none());

        assert!(registry.remove(id).await.is_some());
        assert!(registry.get(id).await.is_none());
        assert!(registry.remove(id).await.is_none());
    }

    #[tokio::test]
    async fn test_registered_session_is_never_replaced() {
        let registry = PoolRegistry::default();
        let first = registry.insert(session()).await.unwrap();

        let duplicate = Session::new(first.id, lazy_pool(), "other");
        let err = registry.insert(duplicate).await.unwrap_err();
        assert!(matches!(err, EngineError::ConnectionFailed { .. }));

        let still = registry.get(first.id).await.unwrap();
        assert_eq!(still.display_name, "nobody@127.0.0.1:1/nothing");
    }

    #[tokio::test]
    async fn test_capacity() {
        let registry = PoolRegistry::new(2);
        registry.insert(session()).await.unwrap();
        registry.insert(session()).await.unwrap();

        let err = registry.insert(session()).await.unwrap_err();
        assert!(matches!(err, EngineError::CapacityReached { max_sessions: 2 }));
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_sweep_idle() {
        let registry = PoolRegistry::default();
        let stale = registry.insert(session()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        let fresh = registry.insert(session()).await.unwrap();

        let swept = registry.sweep_idle(Duration::from_millis(20)).await;
        assert_eq!(swept.len(), 1);
        assert_eq!(swept[0].id, stale.id);
        assert!(registry.get(fresh.id).await.is_some());
        assert!(registry.get(stale.id).await.is_none());
    }

    #[tokio::test]
    async fn test_touch_resets_idle_clock() {
        let registry = PoolRegistry::default();
        let s = registry.insert(session()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(registry.touch(s.id).await);
        assert!(!registry.touch(SessionId::new()).await);

        let swept = registry.sweep_idle(Duration::from_millis(20)).await;
        assert!(swept.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_inserts() {
        let registry = Arc::new(PoolRegistry::default());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                registry.insert(session()).await.map(|s| s.id)
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap());
        }
        ids.sort_by_key(|id| id.0);
        ids.dedup();
        assert_eq!(ids.len(), 16);
        assert_eq!(registry.list().await.len(), 16);
    }
}
