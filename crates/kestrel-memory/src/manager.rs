//! Memory manager.

use chrono::{DateTime, Utc};
use kestrel_core::{EmbeddingModel, Message};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::session::Session;
use crate::store::SessionStore;
use crate::vector::{VectorEntry, VectorStore};

type SessionMap = Arc<RwLock<HashMap<String, Session>>>;

#[derive(Clone)]
struct SemanticIndex {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingModel>,
}

/// Owner of all sessions in the process.
///
/// The session map is guarded by a std lock that is never held across an
/// await. Indexing and persistence run as background tasks tracked in a
/// `JoinSet`; they serialise on `backend_lock`, and each re-reads the session
/// once it holds the lock so that a cleared session, or a message cleared
/// with it, is never resurrected in a backend.
pub struct MemoryManager {
    sessions: SessionMap,
    index: Option<SemanticIndex>,
    persistence: Option<Arc<dyn SessionStore>>,
    backend_lock: Arc<tokio::sync::Mutex<()>>,
    background: Mutex<JoinSet<()>>,
}

impl MemoryManager {
    /// Manager with no optional backends.
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            index: None,
            persistence: None,
            backend_lock: Arc::new(tokio::sync::Mutex::new(())),
            background: Mutex::new(JoinSet::new()),
        }
    }

    /// Enable semantic indexing and search.
    pub fn with_vector_store(
        mut self,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingModel>,
    ) -> Self {
        self.index = Some(SemanticIndex { store, embedder });
        self
    }

    /// Enable session persistence.
    pub fn with_session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.persistence = Some(store);
        self
    }

    pub fn has_vector_store(&self) -> bool {
        self.index.is_some()
    }

    pub fn has_persistence(&self) -> bool {
        self.persistence.is_some()
    }

    /// Append a message, creating the session on first use.
    ///
    /// Indexing and persistence are scheduled in the background; the append
    /// itself cannot fail.
    pub async fn add_message(&self, session_id: &str, message: Message) {
        let indexed = message.clone();
        {
            let mut sessions = self.write_sessions();
            sessions
                .entry(session_id.to_string())
                .or_insert_with(|| Session::new(session_id))
                .push(message);
        }
        debug!(session_id = %session_id, "Appended message");

        if let Some(index) = &self.index {
            self.spawn_index(index.clone(), session_id.to_string(), indexed);
        }
        self.spawn_persist(session_id);
    }

    /// The most recent `limit` messages of a session in original order.
    ///
    /// Unknown sessions yield an empty vector.
    pub fn get_messages(&self, session_id: &str, limit: Option<usize>) -> Vec<Message> {
        self.read_sessions()
            .get(session_id)
            .map(|session| session.recent(limit))
            .unwrap_or_default()
    }

    /// Snapshot of a whole session.
    pub fn session(&self, session_id: &str) -> Option<Session> {
        self.read_sessions().get(session_id).cloned()
    }

    pub fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read_sessions().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn session_count(&self) -> usize {
        self.read_sessions().len()
    }

    /// Set a metadata entry, creating the session on first use.
    pub async fn set_session_metadata(&self, session_id: &str, key: &str, value: Value) {
        {
            let mut sessions = self.write_sessions();
            let session = sessions
                .entry(session_id.to_string())
                .or_insert_with(|| Session::new(session_id));
            session.metadata.insert(key.to_string(), value);
            session.touch();
        }
        self.spawn_persist(session_id);
    }

    pub fn get_session_metadata(&self, session_id: &str, key: &str) -> Option<Value> {
        self.read_sessions()
            .get(session_id)
            .and_then(|session| session.metadata.get(key).cloned())
    }

    /// All metadata of a session.
    pub fn session_metadata(&self, session_id: &str) -> Option<Map<String, Value>> {
        self.read_sessions()
            .get(session_id)
            .map(|session| session.metadata.clone())
    }

    /// Remove a session from memory and from both backends.
    ///
    /// Returns whether the session was held in memory. Backend failures are
    /// logged.
    pub async fn clear_session(&self, session_id: &str) -> bool {
        self.remove_session(session_id, None).await
    }

    /// Semantic search over indexed messages.
    ///
    /// Returns an empty vector when no vector store is configured or the
    /// backend fails.
    pub async fn search_memory(
        &self,
        query: &str,
        session_id: Option<&str>,
        limit: usize,
    ) -> Vec<Message> {
        let Some(index) = &self.index else {
            return Vec::new();
        };

        let embedding = match index.embedder.embed(query).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!(error = %e, "Failed to embed search query");
                return Vec::new();
            }
        };

        match index.store.search(&embedding, session_id, limit).await {
            Ok(matches) => matches.into_iter().map(|m| m.message).collect(),
            Err(e) => {
                warn!(error = %e, "Vector search failed");
                Vec::new()
            }
        }
    }

    /// Clear every session not updated within `max_age`.
    ///
    /// Age is checked again at removal, so a session that receives a message
    /// while cleanup is running is kept. Returns the number of sessions
    /// removed.
    pub async fn cleanup_sessions(&self, max_age: Duration) -> usize {
        let now = Utc::now();
        let candidates: Vec<String> = self
            .read_sessions()
            .values()
            .filter(|session| is_expired(session.last_updated, now, max_age))
            .map(|session| session.id.clone())
            .collect();

        let mut removed = 0;
        for session_id in &candidates {
            if self.remove_session(session_id, Some(max_age)).await {
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, "Cleaned up expired sessions");
        }
        removed
    }

    /// Restore a session from persistence, replacing any in-memory copy.
    ///
    /// Returns whether a persisted session was found.
    pub async fn load_session(&self, session_id: &str) -> bool {
        let Some(store) = &self.persistence else {
            return false;
        };

        match store.load(session_id).await {
            Ok(Some(session)) => {
                debug!(session_id = %session_id, messages = session.messages.len(), "Loaded session");
                self.write_sessions().insert(session_id.to_string(), session);
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Failed to load session");
                false
            }
        }
    }

    /// Load every persisted session into memory.
    ///
    /// Returns the number of sessions restored.
    pub async fn restore_sessions(&self) -> usize {
        let Some(store) = &self.persistence else {
            return 0;
        };

        let ids = match store.list_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "Failed to list persisted sessions");
                return 0;
            }
        };

        let mut restored = 0;
        for session_id in &ids {
            if self.load_session(session_id).await {
                restored += 1;
            }
        }
        info!(restored, "Restored persisted sessions");
        restored
    }

    /// Wait for all background indexing and persistence to finish.
    pub async fn flush(&self) {
        loop {
            let mut pending = std::mem::take(
                &mut *self.background.lock().unwrap_or_else(PoisonError::into_inner),
            );
            if pending.is_empty() {
                return;
            }
            while let Some(result) = pending.join_next().await {
                if let Err(e) = result {
                    warn!(error = %e, "Background memory task failed");
                }
            }
        }
    }

    /// Remove a session under the backend lock, then drop it from both
    /// backends.
    ///
    /// With `max_age` set, an in-memory session is only removed if it is
    /// still expired when the write lock is taken. Holding the backend lock
    /// across removal orders the deletion before any index or persist work
    /// queued by a later append to the same id.
    async fn remove_session(&self, session_id: &str, max_age: Option<Duration>) -> bool {
        let _guard = if self.index.is_some() || self.persistence.is_some() {
            Some(self.backend_lock.lock().await)
        } else {
            None
        };

        let removed = {
            let mut sessions = self.write_sessions();
            let expired = match (sessions.get(session_id), max_age) {
                (Some(session), Some(max_age)) => {
                    is_expired(session.last_updated, Utc::now(), max_age)
                }
                _ => true,
            };
            if !expired {
                debug!(session_id = %session_id, "Session refreshed during cleanup; kept");
                return false;
            }
            sessions.remove(session_id).is_some()
        };

        if let Some(index) = &self.index {
            match index.store.delete_session(session_id).await {
                Ok(count) => debug!(session_id = %session_id, count, "Dropped session vectors"),
                Err(e) => warn!(session_id = %session_id, error = %e, "Failed to drop session vectors"),
            }
        }
        if let Some(store) = &self.persistence
            && let Err(e) = store.delete(session_id).await
        {
            warn!(session_id = %session_id, error = %e, "Failed to delete persisted session");
        }

        if removed {
            debug!(session_id = %session_id, "Cleared session");
        }
        removed
    }

    fn spawn_index(&self, index: SemanticIndex, session_id: String, message: Message) {
        let sessions = Arc::clone(&self.sessions);
        let lock = Arc::clone(&self.backend_lock);
        self.spawn(async move {
            let embedding = match index.embedder.embed(&message.content).await {
                Ok(embedding) => embedding,
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "Failed to embed message");
                    return;
                }
            };

            let _guard = lock.lock().await;
            let still_held = read(&sessions)
                .get(&session_id)
                .is_some_and(|session| session.messages.iter().any(|m| m.id == message.id));
            if !still_held {
                debug!(session_id = %session_id, "Message cleared before indexing; skipped");
                return;
            }
            let entry = VectorEntry {
                session_id: session_id.clone(),
                message,
                embedding,
            };
            if let Err(e) = index.store.upsert(entry).await {
                warn!(session_id = %session_id, error = %e, "Failed to index message");
            }
        });
    }

    fn spawn_persist(&self, session_id: &str) {
        let Some(store) = &self.persistence else {
            return;
        };
        let store = Arc::clone(store);
        let sessions = Arc::clone(&self.sessions);
        let lock = Arc::clone(&self.backend_lock);
        let session_id = session_id.to_string();
        self.spawn(async move {
            let _guard = lock.lock().await;
            let Some(snapshot) = read(&sessions).get(&session_id).cloned() else {
                return;
            };
            if let Err(e) = store.save(&snapshot).await {
                warn!(session_id = %session_id, error = %e, "Failed to persist session");
            }
        });
    }

    fn spawn<F>(&self, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut background = self.background.lock().unwrap_or_else(PoisonError::into_inner);
        while background.try_join_next().is_some() {}
        background.spawn(task);
    }

    fn read_sessions(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Session>> {
        read(&self.sessions)
    }

    fn write_sessions(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Session>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryManager {
    fn default() -> Self {
        Self::new()
    }
}

fn read(sessions: &SessionMap) -> std::sync::RwLockReadGuard<'_, HashMap<String, Session>> {
    sessions.read().unwrap_or_else(PoisonError::into_inner)
}

fn is_expired(last_updated: DateTime<Utc>, now: DateTime<Utc>, max_age: Duration) -> bool {
    (now - last_updated)
        .to_std()
        .is_ok_and(|age| age >= max_age)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemorySessionStore;
    use crate::vector::InMemoryVectorStore;
    use async_trait::async_trait;
    use kestrel_core::{BackendError, BackendKind, BackendResult, HashingEmbedder};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;

    /// One-shot gate: the first caller to pass it signals `entered` and
    /// waits for `release`.
    #[derive(Default)]
    struct Gate {
        armed: AtomicBool,
        entered: Notify,
        release: Notify,
    }

    impl Gate {
        fn armed() -> Arc<Self> {
            let gate = Self::default();
            gate.armed.store(true, Ordering::SeqCst);
            Arc::new(gate)
        }

        async fn pass(&self) -> bool {
            if !self.armed.swap(false, Ordering::SeqCst) {
                return false;
            }
            self.entered.notify_one();
            self.release.notified().await;
            true
        }
    }

    /// Session store whose first delete blocks on a gate.
    struct GatedStore {
        inner: InMemorySessionStore,
        gate: Arc<Gate>,
        first_deleted: Mutex<Option<String>>,
    }

    #[async_trait]
    impl SessionStore for GatedStore {
        async fn save(&self, session: &Session) -> BackendResult<()> {
            self.inner.save(session).await
        }

        async fn load(&self, session_id: &str) -> BackendResult<Option<Session>> {
            self.inner.load(session_id).await
        }

        async fn delete(&self, session_id: &str) -> BackendResult<bool> {
            if self.gate.armed.load(Ordering::SeqCst) {
                *self.first_deleted.lock().unwrap() = Some(session_id.to_string());
            }
            self.gate.pass().await;
            self.inner.delete(session_id).await
        }

        async fn list_ids(&self) -> BackendResult<Vec<String>> {
            self.inner.list_ids().await
        }
    }

    /// Embedder whose first call blocks on a gate.
    struct GatedEmbedder {
        inner: HashingEmbedder,
        gate: Arc<Gate>,
    }

    #[async_trait]
    impl EmbeddingModel for GatedEmbedder {
        fn dimensions(&self) -> usize {
            self.inner.dimensions()
        }

        async fn embed(&self, text: &str) -> BackendResult<Vec<f32>> {
            self.gate.pass().await;
            self.inner.embed(text).await
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl SessionStore for BrokenStore {
        async fn save(&self, _session: &Session) -> BackendResult<()> {
            Err(BackendError::operation(BackendKind::Persistence, "disk full"))
        }

        async fn load(&self, _session_id: &str) -> BackendResult<Option<Session>> {
            Err(BackendError::operation(BackendKind::Persistence, "disk full"))
        }

        async fn delete(&self, _session_id: &str) -> BackendResult<bool> {
            Err(BackendError::operation(BackendKind::Persistence, "disk full"))
        }

        async fn list_ids(&self) -> BackendResult<Vec<String>> {
            Ok(Vec::new())
        }
    }

    struct BrokenVectors;

    #[async_trait]
    impl VectorStore for BrokenVectors {
        async fn upsert(&self, _entry: VectorEntry) -> BackendResult<()> {
            Err(BackendError::operation(BackendKind::VectorStore, "offline"))
        }

        async fn search(
            &self,
            _query: &[f32],
            _session_id: Option<&str>,
            _limit: usize,
        ) -> BackendResult<Vec<crate::vector::VectorMatch>> {
            Err(BackendError::operation(BackendKind::VectorStore, "offline"))
        }

        async fn delete_session(&self, _session_id: &str) -> BackendResult<usize> {
            Err(BackendError::operation(BackendKind::VectorStore, "offline"))
        }
    }

    fn contents(messages: Vec<Message>) -> Vec<String> {
        messages.into_iter().map(|m| m.content).collect()
    }

    fn semantic_manager() -> (MemoryManager, Arc<InMemoryVectorStore>) {
        let vectors = Arc::new(InMemoryVectorStore::new());
        let manager = MemoryManager::new()
            .with_vector_store(vectors.clone(), Arc::new(HashingEmbedder::new(128)));
        (manager, vectors)
    }

    #[tokio::test]
    async fn test_messages_preserve_order_and_limit() {
        let memory = MemoryManager::new();
        memory.add_message("s", Message::user("m1")).await;
        memory.add_message("s", Message::agent("m2")).await;

        assert_eq!(contents(memory.get_messages("s", None)), vec!["m1", "m2"]);
        assert_eq!(contents(memory.get_messages("s", Some(1))), vec!["m2"]);
        assert!(memory.get_messages("unknown", None).is_empty());
    }

    #[tokio::test]
    async fn test_clear_session() {
        let memory = MemoryManager::new();
        memory.add_message("s1", Message::user("hello")).await;
        assert_eq!(contents(memory.get_messages("s1", None)), vec!["hello"]);

        assert!(memory.clear_session("s1").await);
        assert!(memory.get_messages("s1", None).is_empty());
        assert!(!memory.clear_session("s1").await);
    }

    #[tokio::test]
    async fn test_metadata_creates_session() {
        let memory = MemoryManager::new();
        memory
            .set_session_metadata("s", "user", json!("ada"))
            .await;

        assert_eq!(memory.get_session_metadata("s", "user"), Some(json!("ada")));
        assert_eq!(memory.get_session_metadata("s", "other"), None);
        assert_eq!(memory.get_session_metadata("nope", "user"), None);
        assert_eq!(memory.session_count(), 1);
        assert_eq!(memory.session_metadata("s").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_search_without_vector_store_is_empty() {
        let memory = MemoryManager::new();
        memory.add_message("s", Message::user("anything")).await;
        assert!(memory.search_memory("anything", None, 5).await.is_empty());
    }

    #[tokio::test]
    async fn test_search_finds_indexed_messages() {
        let (memory, _vectors) = semantic_manager();
        memory.add_message("s", Message::user("the weather is sunny")).await;
        memory.add_message("s", Message::user("12345 67890")).await;
        memory.add_message("other", Message::user("the weather is rainy")).await;
        memory.flush().await;

        let hits = memory.search_memory("weather sunny", Some("s"), 1).await;
        assert_eq!(contents(hits), vec!["the weather is sunny"]);

        let all = memory.search_memory("weather", None, 5).await;
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_clear_drops_vectors() {
        let (memory, vectors) = semantic_manager();
        memory.add_message("s", Message::user("alpha")).await;
        memory.add_message("t", Message::user("beta")).await;
        memory.flush().await;
        assert_eq!(vectors.len().await, 2);

        memory.clear_session("s").await;
        memory.flush().await;
        assert_eq!(vectors.len().await, 1);
        assert!(memory.search_memory("alpha", Some("s"), 5).await.is_empty());
    }

    #[tokio::test]
    async fn test_backend_failures_do_not_fail_operations() {
        let memory = MemoryManager::new()
            .with_vector_store(Arc::new(BrokenVectors), Arc::new(HashingEmbedder::default()))
            .with_session_store(Arc::new(BrokenStore));

        memory.add_message("s", Message::user("still stored")).await;
        memory.flush().await;

        assert_eq!(contents(memory.get_messages("s", None)), vec!["still stored"]);
        assert!(memory.search_memory("stored", None, 5).await.is_empty());
        assert!(!memory.load_session("s").await);
        assert!(memory.clear_session("s").await);
    }

    #[tokio::test]
    async fn test_persist_and_load() {
        let store = Arc::new(InMemorySessionStore::new());
        let memory = MemoryManager::new().with_session_store(store.clone());
        memory.add_message("s", Message::user("one")).await;
        memory.add_message("s", Message::user("two")).await;
        memory.set_session_metadata("s", "k", json!(1)).await;
        memory.flush().await;

        let persisted = store.load("s").await.unwrap().unwrap();
        assert_eq!(persisted.messages.len(), 2);
        assert_eq!(persisted.metadata["k"], json!(1));

        let restored = MemoryManager::new().with_session_store(store.clone());
        assert!(restored.load_session("s").await);
        assert_eq!(contents(restored.get_messages("s", None)), vec!["one", "two"]);
        assert!(!restored.load_session("missing").await);
    }

    #[tokio::test]
    async fn test_clear_deletes_persisted_copy() {
        let store = Arc::new(InMemorySessionStore::new());
        let memory = MemoryManager::new().with_session_store(store.clone());
        memory.add_message("s", Message::user("x")).await;
        memory.clear_session("s").await;
        memory.flush().await;

        assert!(store.load("s").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_load_without_persistence() {
        assert!(!MemoryManager::new().load_session("s").await);
    }

    #[tokio::test]
    async fn test_cleanup_sessions_by_age() {
        let memory = MemoryManager::new();
        memory.add_message("old", Message::user("a")).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        memory.add_message("fresh", Message::user("b")).await;

        let removed = memory.cleanup_sessions(Duration::from_millis(40)).await;
        assert_eq!(removed, 1);
        assert_eq!(memory.session_ids(), vec!["fresh"]);

        assert_eq!(memory.cleanup_sessions(Duration::from_secs(3600)).await, 0);
    }

    #[tokio::test]
    async fn test_cleanup_keeps_session_refreshed_mid_sweep() {
        let gate = Gate::armed();
        let store = Arc::new(GatedStore {
            inner: InMemorySessionStore::new(),
            gate: gate.clone(),
            first_deleted: Mutex::new(None),
        });
        let memory = Arc::new(MemoryManager::new().with_session_store(store.clone()));
        memory.add_message("a", Message::user("old a")).await;
        memory.add_message("b", Message::user("old b")).await;
        memory.flush().await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        let sweeping = Arc::clone(&memory);
        let cleanup =
            tokio::spawn(async move { sweeping.cleanup_sessions(Duration::from_millis(50)).await });

        gate.entered.notified().await;
        let first = store.first_deleted.lock().unwrap().clone().unwrap();
        let other = if first == "a" { "b" } else { "a" };
        memory.add_message(other, Message::user("fresh")).await;
        gate.release.notify_one();

        assert_eq!(cleanup.await.unwrap(), 1);
        assert!(memory.get_messages(&first, None).is_empty());
        assert_eq!(
            contents(memory.get_messages(other, None)),
            vec![format!("old {other}"), "fresh".to_string()]
        );

        memory.flush().await;
        assert!(store.load(other).await.unwrap().is_some());
        assert!(store.load(&first).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cleared_message_is_not_indexed_into_recreated_session() {
        let gate = Gate::armed();
        let vectors = Arc::new(InMemoryVectorStore::new());
        let embedder = Arc::new(GatedEmbedder {
            inner: HashingEmbedder::new(64),
            gate: gate.clone(),
        });
        let memory = MemoryManager::new().with_vector_store(vectors.clone(), embedder);

        memory.add_message("s", Message::user("secret")).await;
        gate.entered.notified().await;

        assert!(memory.clear_session("s").await);
        memory.add_message("s", Message::user("hello")).await;
        gate.release.notify_one();
        memory.flush().await;

        assert_eq!(vectors.len().await, 1);
        let hits = memory.search_memory("secret", None, 10).await;
        assert_eq!(contents(hits), vec!["hello"]);
        assert_eq!(contents(memory.get_messages("s", None)), vec!["hello"]);
    }

    #[tokio::test]
    async fn test_restore_sessions_loads_every_persisted_session() {
        let store = Arc::new(InMemorySessionStore::new());
        let memory = MemoryManager::new().with_session_store(store.clone());
        memory.add_message("s1", Message::user("one")).await;
        memory.add_message("s2", Message::user("two")).await;
        memory.flush().await;

        let restored = MemoryManager::new().with_session_store(store);
        assert_eq!(restored.restore_sessions().await, 2);
        assert_eq!(restored.session_ids(), vec!["s1", "s2"]);
        assert_eq!(contents(restored.get_messages("s2", None)), vec!["two"]);

        assert_eq!(MemoryManager::new().restore_sessions().await, 0);
    }
}
