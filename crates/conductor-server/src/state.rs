//! Shared application state, cloned into every request handler. Every
//! field is an `Arc`, so cloning `AppState` is cheap.

use std::sync::Arc;

use conductor::heartbeat::HeartbeatStore;
use conductor::knowledge::KnowledgeBase;
use conductor::store::{InMemoryStore, Store};
use conductor::task_manager::TaskManager;
use conductor::tools::default_registry;
use conductor::Conductor;

#[derive(Clone)]
pub struct AppState {
    pub conductor: Conductor,
    pub tasks: Arc<TaskManager>,
    pub heartbeats: Arc<HeartbeatStore>,
    pub knowledge: Arc<KnowledgeBase>,
    pub store: Arc<dyn Store>,
}

impl AppState {
    pub fn new() -> anyhow::Result<Self> {
        let tools = default_registry();
        let conductor = Conductor::new(&tools)?;

        Ok(Self {
            conductor,
            tasks: Arc::new(TaskManager::new()),
            heartbeats: Arc::new(HeartbeatStore::new()),
            knowledge: Arc::new(KnowledgeBase::new()),
            store: Arc::new(InMemoryStore::new()),
        })
    }
}
