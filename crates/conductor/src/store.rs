//! Persistence boundary. The engine treats storage as an external,
//! concurrency-safe contract: callers get single-row upsert semantics,
//! nothing more (no cross-table transactions).
//!
//! The in-memory registries elsewhere in this crate (`HeartbeatStore`,
//! `KnowledgeBase`, `TrustTracker`, `ErrorTracker`, `ApprovalRouter`) own
//! their state directly for this build; `Store` is the seam a real
//! deployment plugs a database into (Postgres, SQLite, ...) to survive a
//! restart, mirroring the semantic tables in use.

use async_trait::async_trait;

use crate::error::ConductorResult;
use crate::model::{App, ErrorPattern, ErrorRecord, Heartbeat, HeartbeatRun, KnowledgeEntry, UserProfile};

#[async_trait]
pub trait Store: Send + Sync {
    async fn get_app_by_api_key(&self, api_key: &str) -> ConductorResult<Option<App>>;
    async fn upsert_app(&self, app: &App) -> ConductorResult<()>;

    async fn get_user_profile(&self, id: &str) -> ConductorResult<Option<UserProfile>>;
    async fn upsert_user_profile(&self, profile: &UserProfile) -> ConductorResult<()>;

    async fn upsert_heartbeat(&self, heartbeat: &Heartbeat) -> ConductorResult<()>;
    async fn list_heartbeats(&self, app_id: &str) -> ConductorResult<Vec<Heartbeat>>;
    async fn delete_heartbeat(&self, id: uuid::Uuid) -> ConductorResult<()>;

    async fn record_heartbeat_run(&self, run: &HeartbeatRun) -> ConductorResult<()>;

    async fn upsert_knowledge_entry(&self, entry: &KnowledgeEntry) -> ConductorResult<()>;
    async fn list_knowledge_entries(&self) -> ConductorResult<Vec<KnowledgeEntry>>;

    async fn get_room_sync_version(&self, room_id: &str) -> ConductorResult<u64>;
    async fn set_room_sync_version(&self, room_id: &str, version: u64) -> ConductorResult<()>;

    async fn record_error(&self, record: &ErrorRecord) -> ConductorResult<()>;
    async fn upsert_error_pattern(&self, pattern: &ErrorPattern) -> ConductorResult<()>;
}

/// Reference implementation backing local development and tests. A
/// production deployment swaps this for a database-backed `Store`
/// without the engine code changing.
pub struct InMemoryStore {
    apps: std::sync::Mutex<std::collections::HashMap<String, App>>,
    user_profiles: std::sync::Mutex<std::collections::HashMap<String, UserProfile>>,
    heartbeats: std::sync::Mutex<std::collections::HashMap<uuid::Uuid, Heartbeat>>,
    heartbeat_runs: std::sync::Mutex<Vec<HeartbeatRun>>,
    knowledge_entries: std::sync::Mutex<std::collections::HashMap<uuid::Uuid, KnowledgeEntry>>,
    room_sync_state: std::sync::Mutex<std::collections::HashMap<String, u64>>,
    error_records: std::sync::Mutex<Vec<ErrorRecord>>,
    error_patterns: std::sync::Mutex<std::collections::HashMap<uuid::Uuid, ErrorPattern>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            apps: Default::default(),
            user_profiles: Default::default(),
            heartbeats: Default::default(),
            heartbeat_runs: Default::default(),
            knowledge_entries: Default::default(),
            room_sync_state: Default::default(),
            error_records: Default::default(),
            error_patterns: Default::default(),
        }
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_app_by_api_key(&self, api_key: &str) -> ConductorResult<Option<App>> {
        Ok(self
            .apps
            .lock()
            .unwrap()
            .values()
            .find(|a| a.api_key == api_key)
            .cloned())
    }

    async fn upsert_app(&self, app: &App) -> ConductorResult<()> {
        self.apps.lock().unwrap().insert(app.id.clone(), app.clone());
        Ok(())
    }

    async fn get_user_profile(&self, id: &str) -> ConductorResult<Option<UserProfile>> {
        Ok(self.user_profiles.lock().unwrap().get(id).cloned())
    }

    async fn upsert_user_profile(&self, profile: &UserProfile) -> ConductorResult<()> {
        self.user_profiles
            .lock()
            .unwrap()
            .insert(profile.id.clone(), profile.clone());
        Ok(())
    }

    async fn upsert_heartbeat(&self, heartbeat: &Heartbeat) -> ConductorResult<()> {
        self.heartbeats.lock().unwrap().insert(heartbeat.id, heartbeat.clone());
        Ok(())
    }

    async fn list_heartbeats(&self, app_id: &str) -> ConductorResult<Vec<Heartbeat>> {
        Ok(self
            .heartbeats
            .lock()
            .unwrap()
            .values()
            .filter(|h| h.app_id == app_id)
            .cloned()
            .collect())
    }

    async fn delete_heartbeat(&self, id: uuid::Uuid) -> ConductorResult<()> {
        self.heartbeats.lock().unwrap().remove(&id);
        Ok(())
    }

    async fn record_heartbeat_run(&self, run: &HeartbeatRun) -> ConductorResult<()> {
        self.heartbeat_runs.lock().unwrap().push(run.clone());
        Ok(())
    }

    async fn upsert_knowledge_entry(&self, entry: &KnowledgeEntry) -> ConductorResult<()> {
        self.knowledge_entries.lock().unwrap().insert(entry.id, entry.clone());
        Ok(())
    }

    async fn list_knowledge_entries(&self) -> ConductorResult<Vec<KnowledgeEntry>> {
        Ok(self.knowledge_entries.lock().unwrap().values().cloned().collect())
    }

    async fn get_room_sync_version(&self, room_id: &str) -> ConductorResult<u64> {
        Ok(self.room_sync_state.lock().unwrap().get(room_id).copied().unwrap_or(0))
    }

    async fn set_room_sync_version(&self, room_id: &str, version: u64) -> ConductorResult<()> {
        self.room_sync_state
            .lock()
            .unwrap()
            .insert(room_id.to_string(), version);
        Ok(())
    }

    async fn record_error(&self, record: &ErrorRecord) -> ConductorResult<()> {
        self.error_records.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn upsert_error_pattern(&self, pattern: &ErrorPattern) -> ConductorResult<()> {
        self.error_patterns.lock().unwrap().insert(pattern.id, pattern.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn app_round_trips_by_api_key() {
        let store = InMemoryStore::new();
        let app = App {
            id: "app1".to_string(),
            name: "Test App".to_string(),
            api_key: "secret".to_string(),
            is_active: true,
        };
        store.upsert_app(&app).await.unwrap();
        let found = store.get_app_by_api_key("secret").await.unwrap();
        assert_eq!(found.unwrap().id, "app1");
    }

    #[tokio::test]
    async fn room_sync_version_defaults_to_zero() {
        let store = InMemoryStore::new();
        assert_eq!(store.get_room_sync_version("unknown").await.unwrap(), 0);
        store.set_room_sync_version("r1", 5).await.unwrap();
        assert_eq!(store.get_room_sync_version("r1").await.unwrap(), 5);
    }
}
